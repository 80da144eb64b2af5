use std::fmt::Debug;

use crate::error::{DocstoreResult, ErrorKind};

use super::ConformanceFailure;

pub(crate) type CheckResult<T = ()> = Result<T, ConformanceFailure>;

/// Turns observations into failures tagged with the scenario name.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checker {
    scenario: &'static str,
}

impl Checker {
    pub(crate) fn new(scenario: &'static str) -> Self {
        Self { scenario }
    }

    pub(crate) fn fail(&self, message: impl Into<String>) -> ConformanceFailure {
        ConformanceFailure::new(self.scenario, message)
    }

    /// Unwraps a result that must succeed.
    pub(crate) fn ok<T>(&self, result: DocstoreResult<T>, what: &str) -> CheckResult<T> {
        result.map_err(|e| self.fail(format!("{}: unexpected error: {}", what, e)))
    }

    /// Requires an error of one of the given kinds.
    pub(crate) fn err_kind<T: Debug>(
        &self,
        result: DocstoreResult<T>,
        kinds: &[ErrorKind],
        what: &str,
    ) -> CheckResult {
        match result {
            Ok(value) => Err(self.fail(format!(
                "{}: got success ({:?}), want {:?}",
                what, value, kinds
            ))),
            Err(e) if kinds.contains(&e.kind()) => Ok(()),
            Err(e) => Err(self.fail(format!(
                "{}: got {} ({}), want {:?}",
                what,
                e.kind(),
                e,
                kinds
            ))),
        }
    }

    pub(crate) fn ensure(&self, condition: bool, message: impl FnOnce() -> String) -> CheckResult {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message()))
        }
    }

    pub(crate) fn eq<T: PartialEq + Debug>(&self, got: &T, want: &T, what: &str) -> CheckResult {
        self.ensure(got == want, || {
            format!("{}:\n  got:  {:?}\n  want: {:?}", what, got, want)
        })
    }
}
