use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::AttributeStatus;
use crate::thresholds::{self, Ideal, MAX_REASONABLE_FAILURE_COUNT};

/// An ATA device-statistics entry (General-Purpose Log 0x04), addressed as
/// `devstat_<page>_<offset>`. Carries enterprise SSD metrics like the
/// Percentage Used Endurance Indicator that never appear in the classic
/// attribute table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtaDevstatAttribute {
    pub attribute_id: String,
    pub value: i64,
    pub threshold: i64,
    pub transformed_value: i64,
    pub status: AttributeStatus,
    pub status_reason: String,
    pub failure_rate: f64,
}

impl AtaDevstatAttribute {
    pub fn new(attribute_id: String, value: i64) -> AtaDevstatAttribute {
        AtaDevstatAttribute {
            attribute_id,
            value,
            ..Default::default()
        }
    }

    pub fn populate_status(&mut self) {
        self.transformed_value = self.value;

        let Some(metadata) = thresholds::DEVSTAT_METADATA.get(self.attribute_id.as_str()) else {
            // No metadata for this statistic; informational only
            return;
        };

        // Some firmware reports corrupted values (hundreds of billions) for
        // low-is-healthy statistics; flag instead of failing the device
        if metadata.ideal == Ideal::Low && self.value > MAX_REASONABLE_FAILURE_COUNT {
            self.status = self.status.with(AttributeStatus::INVALID_VALUE);
            self.status_reason = format!(
                "Observed value {} exceeds reasonable maximum",
                self.value
            );
            return;
        }

        if metadata.error_count {
            // Error counters without a fixed fail threshold warn on any
            // non-zero value but never fail outright
            if self.value > 0 {
                self.status = self.status.with(AttributeStatus::WARNING_SCRUTINY);
                self.status_reason = format!(
                    "{} has a non-zero error count ({})",
                    metadata.display_name, self.value
                );
            }
            return;
        }

        if let Some(threshold) = metadata.threshold {
            if metadata.ideal == Ideal::Low && self.value >= threshold {
                self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                self.status_reason = format!(
                    "{} reached its failure threshold ({} >= {})",
                    metadata.display_name, self.value, threshold
                );
            }
        }
    }

    pub fn flatten(&self) -> Map<String, Value> {
        let prefix = format!("attr.{}", self.attribute_id);
        let mut fields = Map::new();
        fields.insert(
            format!("{prefix}.attribute_id"),
            Value::from(self.attribute_id.clone()),
        );
        fields.insert(format!("{prefix}.value"), Value::from(self.value));
        fields.insert(format!("{prefix}.thresh"), Value::from(self.threshold));
        fields.insert(
            format!("{prefix}.transformed_value"),
            Value::from(self.transformed_value),
        );
        fields.insert(format!("{prefix}.status"), Value::from(self.status.0));
        fields.insert(
            format!("{prefix}.status_reason"),
            Value::from(self.status_reason.clone()),
        );
        fields.insert(format!("{prefix}.failure_rate"), Value::from(self.failure_rate));
        fields
    }

    pub fn inflate(&mut self, key: &str, value: &Value) {
        let Some(field) = key.rsplit('.').next() else {
            return;
        };
        match field {
            "attribute_id" => {
                self.attribute_id = value.as_str().unwrap_or_default().to_string()
            }
            "value" => self.value = value.as_i64().unwrap_or(0),
            "thresh" => self.threshold = value.as_i64().unwrap_or(0),
            "transformed_value" => self.transformed_value = value.as_i64().unwrap_or(0),
            "status" => self.status = AttributeStatus(value.as_i64().unwrap_or(0)),
            "status_reason" => self.status_reason = value.as_str().unwrap_or_default().to_string(),
            "failure_rate" => self.failure_rate = value.as_f64().unwrap_or(0.0),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_used_below_threshold_passes() {
        let mut attr = AtaDevstatAttribute::new("devstat_7_8".to_string(), 19);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
        assert_eq!(attr.transformed_value, 19);
    }

    #[test]
    fn test_percentage_used_at_threshold_fails() {
        let mut attr = AtaDevstatAttribute::new("devstat_7_8".to_string(), 100);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
        assert!(!attr.status_reason.is_empty());
    }

    #[test]
    fn test_percentage_used_above_threshold_fails() {
        let mut attr = AtaDevstatAttribute::new("devstat_7_8".to_string(), 150);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_unknown_statistic_passes() {
        let mut attr = AtaDevstatAttribute::new("devstat_99_99".to_string(), 42);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
        assert_eq!(attr.transformed_value, 42);
    }

    #[test]
    fn test_impossibly_high_value_is_invalid() {
        // some drives report corrupted values like 420 billion
        let mut attr = AtaDevstatAttribute::new("devstat_7_8".to_string(), 420_000_000_000);
        attr.populate_status();
        assert!(
            attr.status.has(AttributeStatus::INVALID_VALUE),
            "impossibly high value should be marked as invalid"
        );
        assert!(
            !attr.status.has(AttributeStatus::FAILED_SCRUTINY),
            "invalid values should not trigger failure status"
        );
        assert!(attr.status_reason.contains("exceeds reasonable maximum"));
    }

    #[test]
    fn test_invalid_value_boundary() {
        let mut attr = AtaDevstatAttribute::new(
            "devstat_7_8".to_string(),
            MAX_REASONABLE_FAILURE_COUNT + 1,
        );
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::INVALID_VALUE));
    }

    #[test]
    fn test_value_at_boundary_still_evaluated() {
        let mut attr =
            AtaDevstatAttribute::new("devstat_7_8".to_string(), MAX_REASONABLE_FAILURE_COUNT);
        attr.populate_status();
        assert!(
            !attr.status.has(AttributeStatus::INVALID_VALUE),
            "value at limit should not be marked as invalid"
        );
        assert!(
            attr.status.has(AttributeStatus::FAILED_SCRUTINY),
            "high but valid value should fail the endurance threshold"
        );
    }

    #[test]
    fn test_invalid_value_noncritical_statistic() {
        let mut attr = AtaDevstatAttribute::new("devstat_5_88".to_string(), 999_999_999_999);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::INVALID_VALUE));
    }

    #[test]
    fn test_error_count_nonzero_warns_not_fails() {
        // a reported-uncorrectable count of 452 is a warning; error counts
        // have no fixed fail threshold
        let mut attr = AtaDevstatAttribute::new("devstat_4_8".to_string(), 452);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::WARNING_SCRUTINY));
        assert!(!attr.status.has(AttributeStatus::FAILED_SCRUTINY));
        assert!(attr.status_reason.contains("non-zero error count"));
    }

    #[test]
    fn test_error_count_zero_passes() {
        let mut attr = AtaDevstatAttribute::new("devstat_4_8".to_string(), 0);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }

    #[test]
    fn test_reallocated_sectors_nonzero_warns() {
        let mut attr = AtaDevstatAttribute::new("devstat_3_32".to_string(), 5);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::WARNING_SCRUTINY));
        assert!(!attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_mechanical_start_failures_zero_passes() {
        let mut attr = AtaDevstatAttribute::new("devstat_3_48".to_string(), 0);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }

    #[test]
    fn test_flatten_inflate_round_trip() {
        let original = AtaDevstatAttribute {
            attribute_id: "devstat_7_8".to_string(),
            value: 42,
            threshold: 100,
            transformed_value: 42,
            status: AttributeStatus::WARNING_SCRUTINY,
            status_reason: "Test warning".to_string(),
            failure_rate: 0.5,
        };

        let flattened = original.flatten();
        let mut restored = AtaDevstatAttribute::default();
        for (key, value) in &flattened {
            restored.inflate(key, value);
        }

        assert_eq!(restored.attribute_id, original.attribute_id);
        assert_eq!(restored.value, original.value);
        assert_eq!(restored.threshold, original.threshold);
        assert_eq!(restored.transformed_value, original.transformed_value);
        assert_eq!(restored.status, original.status);
        assert_eq!(restored.status_reason, original.status_reason);
        assert_eq!(restored.failure_rate, original.failure_rate);
    }
}
