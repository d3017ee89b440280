// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::testjson::{TestCase, TestName};
use std::{collections::BTreeSet, fmt};

/// Which failures are rerun.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum FailureFilter {
    /// Failed subtests are rerun on their own. A root test with failed subtests isn't rerun
    /// separately.
    Unique,

    /// Only root tests are rerun, including all of their subtests.
    RootCasesOnly,
}

impl FailureFilter {
    pub(super) fn new(root_cases_only: bool) -> Self {
        if root_cases_only {
            Self::RootCasesOnly
        } else {
            Self::Unique
        }
    }

    /// Returns the distinct failures to rerun, sorted by package and test name.
    pub(super) fn apply<'a>(
        self,
        failures: impl IntoIterator<Item = &'a TestCase>,
    ) -> Vec<(&'a str, &'a TestName)> {
        let unique: BTreeSet<(&str, &TestName)> = failures
            .into_iter()
            .map(|tc| (tc.package.as_str(), &tc.name))
            .collect();

        match self {
            Self::Unique => unique
                .iter()
                .filter(|(package, name)| !has_failed_subtest(&unique, package, name))
                .copied()
                .collect(),
            Self::RootCasesOnly => unique
                .into_iter()
                .filter(|(_, name)| !name.is_subtest())
                .collect(),
        }
    }
}

fn has_failed_subtest(unique: &BTreeSet<(&str, &TestName)>, package: &str, name: &TestName) -> bool {
    if name.is_empty() {
        return false;
    }
    // Names sharing a prefix are contiguous, so only the first candidate needs checking.
    let prefix = TestName::new(format!("{name}/"));
    unique
        .range((package, &prefix)..)
        .next()
        .is_some_and(|(p, n)| *p == package && n.as_str().starts_with(prefix.as_str()))
}

/// The tests to run in one `go test` invocation of a rerun round.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct RerunSelection {
    /// The package to test.
    pub package: String,

    /// The `-run` expression, or None to run the whole package.
    pub run: Option<String>,
}

impl RerunSelection {
    /// Selects a single failed test.
    ///
    /// The empty name selects the whole package, since the package failed outside of any test.
    pub fn new(package: impl Into<String>, name: &TestName) -> Self {
        let run = (!name.is_empty()).then(|| run_expression(name));
        Self {
            package: package.into(),
            run,
        }
    }
}

impl fmt::Display for RerunSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.run {
            Some(run) => write!(f, "{} -run={run}", self.package),
            None => write!(f, "{}", self.package),
        }
    }
}

/// Builds a `-run` expression that matches exactly one test.
///
/// `go test` matches each `/`-separated element of the expression against the corresponding
/// element of the test name, so every element is anchored and escaped on its own.
pub fn run_expression(name: &TestName) -> String {
    name.as_str()
        .split('/')
        .map(|segment| format!("^{}$", regex::escape(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use test_case::test_case;
    use test_strategy::proptest;

    fn failed(package: &str, name: &str) -> TestCase {
        TestCase {
            package: package.to_owned(),
            name: TestName::new(name),
            time: None,
            elapsed: crate::testjson::TestDuration::NeverFinished,
            has_failed_subtest: false,
        }
    }

    fn names(selected: Vec<(&str, &TestName)>) -> Vec<String> {
        selected
            .into_iter()
            .map(|(package, name)| format!("{package}:{name}"))
            .collect()
    }

    fn fixture() -> Vec<TestCase> {
        vec![
            failed("pkg/b", "TestB"),
            failed("pkg/a", "TestA/sub/leaf"),
            failed("pkg/a", "TestA/sub"),
            failed("pkg/a", "TestA"),
            failed("pkg/a", "TestA-other"),
            failed("pkg/a", "TestA"),
            failed("pkg/c", ""),
            failed("pkg/b", "TestB"),
        ]
    }

    #[test]
    fn unique_drops_parents() {
        let failures = fixture();
        assert_eq!(
            names(FailureFilter::Unique.apply(&failures)),
            vec!["pkg/a:TestA-other", "pkg/a:TestA/sub/leaf", "pkg/b:TestB", "pkg/c:"]
        );
    }

    #[test]
    fn root_cases_only() {
        let failures = fixture();
        assert_eq!(
            names(FailureFilter::RootCasesOnly.apply(&failures)),
            vec!["pkg/a:TestA", "pkg/a:TestA-other", "pkg/b:TestB", "pkg/c:"]
        );
    }

    #[test_case("TestA", "^TestA$"; "root")]
    #[test_case("TestA/sub_test", "^TestA$/^sub_test$"; "subtest")]
    #[test_case("TestA/a.b(c)/[d]", r"^TestA$/^a\.b\(c\)$/^\[d\]$"; "metacharacters")]
    fn run_expressions(name: &str, expected: &str) {
        assert_eq!(run_expression(&TestName::new(name)), expected);
    }

    #[test]
    fn test_main_selects_package() {
        let selection = RerunSelection::new("pkg/c", &TestName::default());
        assert_eq!(selection.run, None);
        assert_eq!(selection.to_string(), "pkg/c");
    }

    #[proptest(cases = 64)]
    fn segments_match_only_themselves(
        #[strategy("[^/]{0,12}")] segment: String,
        #[strategy("[^/]{0,12}")] other: String,
    ) {
        let expression = run_expression(&TestName::new(segment.clone()));
        let regex = Regex::new(&expression).expect("expression is a valid regex");
        assert!(regex.is_match(&segment));
        if other != segment {
            assert!(!regex.is_match(&other));
        }
    }
}
