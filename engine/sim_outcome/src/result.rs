//! Per-test-case result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status of a single test case.
///
/// Variants are ordered by severity; merging two results for the same test
/// keeps the more severe one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Output matched the recorded expectation (or was regenerated in TRAIN).
    Passed,
    /// The test ran but its checks or expectation diff failed.
    Failed,
    /// The test case itself crashed: the child process died, hung up
    /// without a result, or reported an internal error.
    Crashed,
}

impl TestStatus {
    pub fn is_passed(self) -> bool {
        matches!(self, TestStatus::Passed)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, TestStatus::Failed)
    }

    pub fn is_crashed(self) -> bool {
        matches!(self, TestStatus::Crashed)
    }
}

/// Result of running a single test case.
///
/// Field order matters: the derived `Ord` compares `status` first, which is
/// what [`crate::Outcome::merge`] relies on to resolve duplicates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    /// Failure details, diff lines, or crash diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    /// Regenerated expectation payload (TRAIN mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<String>,
    /// Wall time spent executing the test case.
    #[serde(default, rename = "duration_ms", with = "millis")]
    pub duration: Duration,
}

impl TestResult {
    /// Create a passed result.
    pub fn passed(duration: Duration) -> Self {
        TestResult {
            status: TestStatus::Passed,
            messages: Vec::new(),
            expectation: None,
            duration,
        }
    }

    /// Create a failed result.
    #[cold]
    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        TestResult {
            status: TestStatus::Failed,
            messages: vec![message.into()],
            expectation: None,
            duration,
        }
    }

    /// Create a crashed result.
    #[cold]
    pub fn crashed(message: impl Into<String>, duration: Duration) -> Self {
        TestResult {
            status: TestStatus::Crashed,
            messages: vec![message.into()],
            expectation: None,
            duration,
        }
    }

    /// Attach a regenerated expectation payload.
    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<String>) -> Self {
        self.expectation = Some(expectation.into());
        self
    }
}

/// Serialize a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
