// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::MaxFailParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Type for the max-fail flag and configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MaxFail {
    /// Stop the run once this many tests have failed.
    Count(usize),

    /// Run all tests.
    #[default]
    All,
}

impl MaxFail {
    /// Returns the configured maximum if `failed` reaches it, or None otherwise.
    pub fn is_exceeded(&self, failed: usize) -> Option<usize> {
        match self {
            Self::Count(max_fail) => (failed >= *max_fail).then_some(*max_fail),
            Self::All => None,
        }
    }
}

impl FromStr for MaxFail {
    type Err = MaxFailParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let max_fail = s
            .parse::<isize>()
            .map_err(|e| MaxFailParseError::new(format!("{e} parsing '{s}'")))?;
        if max_fail <= 0 {
            return Err(MaxFailParseError::new("max-fail may not be <= 0"));
        }
        Ok(Self::Count(max_fail as usize))
    }
}

impl fmt::Display for MaxFail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Count(max_fail) => write!(f, "{max_fail}"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxFail {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = MaxFail;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer or the string \"all\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "all" {
                    return Ok(MaxFail::All);
                }

                // Environment and CLI values arrive as strings.
                match v.parse::<i64>() {
                    Ok(n) => self.visit_i64(n),
                    Err(_) => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &"the string \"all\" or a positive integer",
                    )),
                }
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v > 0 {
                    Ok(MaxFail::Count(v as usize))
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &"a positive integer or the string \"all\"",
                    ))
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_i64(i64::try_from(v).unwrap_or(i64::MAX))
            }
        }

        deserializer.deserialize_any(V)
    }
}
