use serde::{Deserialize, Serialize};

/// Outcome counts reported by one test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub xfailed: u32,
    pub xpassed: u32,
    pub warning: u32,
    pub error: u32,
    pub deselected: u32,
}

/// Normalized test-run counts.
///
/// `total` is always `passed + xfailed + failed + skipped + warning + error`;
/// `xpassed` and `deselected` are reported but do not count towards it. The
/// total is recomputed on construction and on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SummaryRecord", into = "SummaryRecord")]
pub struct TestResultSummary {
    counts: OutcomeCounts,
    total: u32,
}

#[derive(Serialize, Deserialize)]
struct SummaryRecord {
    #[serde(default)]
    total: u32,
    #[serde(flatten)]
    counts: OutcomeCounts,
}

impl From<SummaryRecord> for TestResultSummary {
    fn from(record: SummaryRecord) -> Self {
        Self::new(record.counts)
    }
}

impl From<TestResultSummary> for SummaryRecord {
    fn from(summary: TestResultSummary) -> Self {
        Self {
            total: summary.total,
            counts: summary.counts,
        }
    }
}

impl TestResultSummary {
    pub fn new(counts: OutcomeCounts) -> Self {
        let total = counts
            .passed
            .saturating_add(counts.xfailed)
            .saturating_add(counts.failed)
            .saturating_add(counts.skipped)
            .saturating_add(counts.warning)
            .saturating_add(counts.error);
        Self { counts, total }
    }

    /// The summary recorded when collection failed before any test ran.
    pub fn collection_error() -> Self {
        Self::new(OutcomeCounts {
            error: 1,
            ..Default::default()
        })
    }

    pub fn counts(&self) -> &OutcomeCounts {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn passed(&self) -> u32 {
        self.counts.passed
    }

    pub fn failed(&self) -> u32 {
        self.counts.failed
    }

    pub fn error(&self) -> u32 {
        self.counts.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_total_excludes_xpassed_and_deselected() {
        let summary = TestResultSummary::new(OutcomeCounts {
            passed: 3,
            failed: 1,
            warning: 2,
            xpassed: 5,
            deselected: 7,
            ..Default::default()
        });
        assert_eq!(summary.total(), 6);
    }

    #[test]
    fn test_deserialize_recomputes_total() {
        let summary: TestResultSummary =
            serde_json::from_str(r#"{"total": 99, "passed": 2, "error": 1}"#).unwrap();
        assert_eq!(summary.total(), 3);

        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["passed"], 2);
    }

    #[test]
    fn test_total_saturates_at_u32_max() {
        let summary = TestResultSummary::new(OutcomeCounts {
            passed: u32::MAX,
            failed: 1,
            error: 3,
            ..Default::default()
        });
        assert_eq!(summary.total(), u32::MAX);
    }

    #[test]
    fn test_collection_error_summary() {
        let summary = TestResultSummary::collection_error();
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.error(), 1);
    }

    proptest! {
        #[test]
        fn prop_total_law(
            passed in any::<u32>(), failed in any::<u32>(), skipped in 0u32..1000,
            xfailed in 0u32..1000, xpassed in any::<u32>(), warning in 0u32..1000,
            error in any::<u32>(), deselected in any::<u32>(),
        ) {
            let summary = TestResultSummary::new(OutcomeCounts {
                passed, failed, skipped, xfailed, xpassed, warning, error, deselected,
            });
            let expected = [passed, xfailed, failed, skipped, warning, error]
                .iter()
                .map(|&n| u64::from(n))
                .sum::<u64>()
                .min(u64::from(u32::MAX));
            prop_assert_eq!(u64::from(summary.total()), expected);
        }
    }
}
