// Conversion counters and failure samples

use crate::archive::SkippedEntry;
use crate::transform::CoercionFailure;

/// Coercion failures kept verbatim; the rest are only counted
pub const MAX_FAILURE_SAMPLES: usize = 100;

/// What happened while converting one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Payloads extracted from the source
    pub payloads: u64,
    /// Payloads without a header line
    pub empty_payloads: u64,
    /// Data rows read (header lines excluded, syntax errors included)
    pub rows_read: u64,
    /// Records appended to an encoder
    pub rows_written: u64,
    /// Rows with the wrong cell count, or rejected by the CSV reader
    pub malformed_rows: u64,
    /// Cells that could not be coerced
    pub coercion_failures: u64,
    /// Cells holding invalid UTF-8, written with U+FFFD replacements
    pub lossy_cells: u64,
    /// First failures, in input order
    pub failure_samples: Vec<CoercionFailure>,
    pub skipped_entries: Vec<SkippedEntry>,
    /// Partition keys written, in key order (empty when not partitioning)
    pub partitions: Vec<String>,
}

impl ConversionSummary {
    pub(crate) fn record_failures(&mut self, failures: Vec<CoercionFailure>) {
        self.coercion_failures += failures.len() as u64;
        let room = MAX_FAILURE_SAMPLES.saturating_sub(self.failure_samples.len());
        self.failure_samples.extend(failures.into_iter().take(room));
    }

    /// Nothing was rejected, replaced or skipped
    pub fn is_clean(&self) -> bool {
        self.coercion_failures == 0
            && self.malformed_rows == 0
            && self.lossy_cells == 0
            && self.skipped_entries.is_empty()
    }

    /// Whether at least one payload had a header, so a container was written
    pub fn has_output(&self) -> bool {
        self.payloads > self.empty_payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::FailureReason;

    fn failure(line: u64) -> CoercionFailure {
        CoercionFailure {
            line,
            field: "UsageQuantity".to_string(),
            value: "x".to_string(),
            reason: FailureReason::InvalidFloat,
        }
    }

    #[test]
    fn test_failure_samples_are_capped() {
        let mut summary = ConversionSummary::default();
        summary.record_failures((0..70).map(failure).collect());
        summary.record_failures((70..150).map(failure).collect());

        assert_eq!(summary.coercion_failures, 150);
        assert_eq!(summary.failure_samples.len(), MAX_FAILURE_SAMPLES);
        assert_eq!(summary.failure_samples.last().unwrap().line, 99);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_default_is_clean() {
        let summary = ConversionSummary::default();
        assert!(summary.is_clean());
        assert!(!summary.has_output());
    }
}
