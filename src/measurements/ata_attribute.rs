use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collector::AtaSmartAttributesTableItem;
use crate::status::AttributeStatus;
use crate::thresholds::{self, AtaAttributeMetadata, Ideal, MAX_REASONABLE_FAILURE_COUNT};

pub const WHEN_FAILED_FAILING_NOW: &str = "FAILING_NOW";
pub const WHEN_FAILED_IN_THE_PAST: &str = "IN_THE_PAST";

/// A single row of the ATA SMART attribute table, annotated with the
/// analyzer's derived status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtaAttribute {
    pub attribute_id: i32,
    pub name: String,
    pub value: i64,
    pub worst: i64,
    pub threshold: i64,
    pub raw_value: i64,
    pub raw_string: String,
    pub when_failed: String,
    pub transformed_value: i64,
    pub status: AttributeStatus,
    pub status_reason: String,
    pub failure_rate: f64,
}

impl AtaAttribute {
    pub fn from_collector(item: &AtaSmartAttributesTableItem) -> AtaAttribute {
        AtaAttribute {
            attribute_id: item.id,
            name: item.name.clone(),
            value: item.value,
            worst: item.worst,
            threshold: item.thresh,
            raw_value: item.raw.value,
            raw_string: item.raw.string.clone(),
            when_failed: item.when_failed.clone(),
            ..Default::default()
        }
    }

    /// Derive the attribute status from the manufacturer pass/fail flag and
    /// the observed-failure-rate metadata.
    pub fn populate_status(&mut self) {
        if self.when_failed == WHEN_FAILED_FAILING_NOW {
            self.status = self.status.with(AttributeStatus::FAILED_SMART);
            self.status_reason = "Attribute is failing manufacturer SMART threshold".to_string();
        } else if self.when_failed == WHEN_FAILED_IN_THE_PAST {
            self.status = self.status.with(AttributeStatus::WARNING_SCRUTINY);
            self.status_reason =
                "Attribute has failed manufacturer SMART threshold in the past".to_string();
        }

        if let Some(metadata) = thresholds::ATA_METADATA.get(&self.attribute_id) {
            self.transformed_value = match metadata.transform {
                Some(transform) => transform(self.value, self.raw_value, &self.raw_string),
                None => self.raw_value,
            };
            self.validate_threshold(metadata);
        } else {
            self.transformed_value = self.raw_value;
        }
    }

    /// Classify the raw value against the attribute's observed-failure-rate
    /// buckets. When the point estimate is zero but the confidence interval
    /// is not, the interval midpoint stands in for the rate.
    pub fn validate_threshold(&mut self, metadata: &AtaAttributeMetadata) {
        if metadata.ideal == Ideal::Low && self.raw_value > MAX_REASONABLE_FAILURE_COUNT {
            self.status = self.status.with(AttributeStatus::INVALID_VALUE);
            self.status_reason = format!(
                "Observed value {} exceeds reasonable maximum",
                self.raw_value
            );
            return;
        }

        for bucket in &metadata.observed_thresholds {
            if bucket.low <= self.raw_value && self.raw_value <= bucket.high {
                let mut rate = bucket.annual_failure_rate;
                if rate == 0.0 && bucket.error_interval != [0.0, 0.0] {
                    rate = (bucket.error_interval[0] + bucket.error_interval[1]) / 2.0;
                }
                self.failure_rate = rate;

                if metadata.critical {
                    if rate >= 0.10 {
                        self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                        self.status_reason =
                            "Observed Failure Rate for Critical Attribute is greater than 10%"
                                .to_string();
                    }
                } else if rate >= 0.20 {
                    self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                    self.status_reason =
                        "Observed Failure Rate for Non-Critical Attribute is greater than 20%"
                            .to_string();
                } else if rate >= 0.10 {
                    self.status = self.status.with(AttributeStatus::WARNING_SCRUTINY);
                    self.status_reason =
                        "Observed Failure Rate for Non-Critical Attribute is greater than 10%"
                            .to_string();
                }
                break;
            }
        }
    }

    pub fn flatten(&self) -> Map<String, Value> {
        let prefix = format!("attr.{}", self.attribute_id);
        let mut fields = Map::new();
        fields.insert(format!("{prefix}.attribute_id"), Value::from(self.attribute_id));
        fields.insert(format!("{prefix}.name"), Value::from(self.name.clone()));
        fields.insert(format!("{prefix}.value"), Value::from(self.value));
        fields.insert(format!("{prefix}.worst"), Value::from(self.worst));
        fields.insert(format!("{prefix}.thresh"), Value::from(self.threshold));
        fields.insert(format!("{prefix}.raw_value"), Value::from(self.raw_value));
        fields.insert(format!("{prefix}.raw_string"), Value::from(self.raw_string.clone()));
        fields.insert(format!("{prefix}.when_failed"), Value::from(self.when_failed.clone()));
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
            "attribute_id" => self.attribute_id = value.as_i64().unwrap_or(0) as i32,
            "name" => self.name = value.as_str().unwrap_or_default().to_string(),
            "value" => self.value = value.as_i64().unwrap_or(0),
            "worst" => self.worst = value.as_i64().unwrap_or(0),
            "thresh" => self.threshold = value.as_i64().unwrap_or(0),
            "raw_value" => self.raw_value = value.as_i64().unwrap_or(0),
            "raw_string" => self.raw_string = value.as_str().unwrap_or_default().to_string(),
            "when_failed" => self.when_failed = value.as_str().unwrap_or_default().to_string(),
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
    use crate::thresholds::{DisplayType, ObservedThreshold};

    fn metadata_with_bucket(critical: bool, rate: f64, interval: [f64; 2]) -> AtaAttributeMetadata {
        AtaAttributeMetadata {
            id: 200,
            display_name: "Test Attribute",
            ideal: Ideal::Low,
            critical,
            display_type: DisplayType::Raw,
            transform: None,
            observed_thresholds: vec![ObservedThreshold {
                low: 0,
                high: 10,
                annual_failure_rate: rate,
                error_interval: interval,
            }],
            use_delta_evaluation: false,
        }
    }

    #[test]
    fn test_validate_threshold_nonzero_rate_critical_fails() {
        let mut attr = AtaAttribute {
            raw_value: 5,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(true, 0.15, [0.12, 0.18]));
        assert!((attr.failure_rate - 0.15).abs() < 0.001);
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_validate_threshold_zero_rate_zero_interval_no_change() {
        let mut attr = AtaAttribute {
            raw_value: 5,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(false, 0.0, [0.0, 0.0]));
        assert_eq!(attr.failure_rate, 0.0);
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }

    #[test]
    fn test_validate_threshold_zero_rate_real_interval_uses_midpoint() {
        let mut attr = AtaAttribute {
            raw_value: 5,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(false, 0.0, [0.08, 0.12]));
        assert!((attr.failure_rate - 0.10).abs() < 0.001);
        assert!(attr.status.has(AttributeStatus::WARNING_SCRUTINY));
    }

    #[test]
    fn test_validate_threshold_critical_inferred_rate_fails() {
        let mut attr = AtaAttribute {
            raw_value: 5,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(true, 0.0, [0.10, 0.14]));
        assert!((attr.failure_rate - 0.12).abs() < 0.001);
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_validate_threshold_noncritical_high_inferred_rate_fails() {
        let mut attr = AtaAttribute {
            raw_value: 5,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(false, 0.0, [0.18, 0.26]));
        assert!((attr.failure_rate - 0.22).abs() < 0.001);
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_validate_threshold_impossible_value_is_invalid_not_failed() {
        let mut attr = AtaAttribute {
            raw_value: MAX_REASONABLE_FAILURE_COUNT + 1,
            ..Default::default()
        };
        attr.validate_threshold(&metadata_with_bucket(true, 0.5, [0.0, 0.0]));
        assert!(attr.status.has(AttributeStatus::INVALID_VALUE));
        assert!(!attr.status.has(AttributeStatus::FAILED_SCRUTINY));
        assert!(attr.status_reason.contains("exceeds reasonable maximum"));
    }

    #[test]
    fn test_populate_status_manufacturer_failing_now() {
        let mut attr = AtaAttribute {
            attribute_id: 5,
            raw_value: 0,
            when_failed: WHEN_FAILED_FAILING_NOW.to_string(),
            ..Default::default()
        };
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::FAILED_SMART));
        assert_eq!(
            attr.status_reason,
            "Attribute is failing manufacturer SMART threshold"
        );
    }

    #[test]
    fn test_populate_status_transforms_power_on_hours() {
        let mut attr = AtaAttribute {
            attribute_id: 9,
            value: 97,
            raw_value: 167031278144165,
            raw_string: "2725 (151 234 0)".to_string(),
            ..Default::default()
        };
        attr.populate_status();
        assert_eq!(attr.transformed_value, 2725);
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }

    #[test]
    fn test_flatten_inflate_round_trip() {
        let original = AtaAttribute {
            attribute_id: 199,
            name: "UDMA_CRC_Error_Count".to_string(),
            value: 200,
            worst: 200,
            threshold: 0,
            raw_value: 5,
            raw_string: "5".to_string(),
            when_failed: String::new(),
            transformed_value: 5,
            status: AttributeStatus::WARNING_SCRUTINY,
            status_reason: "Observed Failure Rate for Non-Critical Attribute is greater than 10%"
                .to_string(),
            failure_rate: 0.124,
        };

        let flattened = original.flatten();
        let mut restored = AtaAttribute::default();
        for (key, value) in &flattened {
            restored.inflate(key, value);
        }

        assert_eq!(restored.attribute_id, original.attribute_id);
        assert_eq!(restored.name, original.name);
        assert_eq!(restored.raw_value, original.raw_value);
        assert_eq!(restored.transformed_value, original.transformed_value);
        assert_eq!(restored.status, original.status);
        assert_eq!(restored.status_reason, original.status_reason);
        assert_eq!(restored.failure_rate, original.failure_rate);
    }
}
