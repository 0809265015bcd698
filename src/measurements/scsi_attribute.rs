use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::AttributeStatus;
use crate::thresholds;

/// A SCSI error-log entry (or the grown defect list / temperature reading).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScsiAttribute {
    pub attribute_id: String,
    pub value: i64,
    /// -1 means informational only.
    pub threshold: i64,
    pub transformed_value: i64,
    pub status: AttributeStatus,
    pub status_reason: String,
}

impl ScsiAttribute {
    pub fn new(attribute_id: &str, value: i64, threshold: i64) -> ScsiAttribute {
        ScsiAttribute {
            attribute_id: attribute_id.to_string(),
            value,
            threshold,
            ..Default::default()
        }
    }

    pub fn populate_status(&mut self) {
        self.transformed_value = self.value;

        if self.threshold < 0 {
            return;
        }

        if self.value > self.threshold {
            let metadata = thresholds::SCSI_METADATA.get(self.attribute_id.as_str());
            let critical = metadata.map(|m| m.critical).unwrap_or(false);
            let error_count = metadata.map(|m| m.error_count).unwrap_or(false);

            if critical && !error_count {
                self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                self.status_reason = format!(
                    "Value {} exceeds failure threshold ({})",
                    self.value, self.threshold
                );
            } else {
                self.status = self.status.with(AttributeStatus::WARNING_SCRUTINY);
                self.status_reason = format!(
                    "{} has a non-zero error count ({})",
                    self.attribute_id, self.value
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
        fields
    }

    pub fn inflate(&mut self, key: &str, value: &Value) {
        let Some(field) = key.rsplit('.').next() else {
            return;
        };
        match field {
            "attribute_id" => self.attribute_id = value.as_str().unwrap_or_default().to_string(),
            "value" => self.value = value.as_i64().unwrap_or(0),
            "thresh" => self.threshold = value.as_i64().unwrap_or(0),
            "transformed_value" => self.transformed_value = value.as_i64().unwrap_or(0),
            "status" => self.status = AttributeStatus(value.as_i64().unwrap_or(0)),
            "status_reason" => self.status_reason = value.as_str().unwrap_or_default().to_string(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grown_defect_list_nonzero_fails() {
        let mut attr = ScsiAttribute::new("scsi_grown_defect_list", 8, 0);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_grown_defect_list_zero_passes() {
        let mut attr = ScsiAttribute::new("scsi_grown_defect_list", 0, 0);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }

    #[test]
    fn test_uncorrected_errors_fail() {
        let mut attr = ScsiAttribute::new("read_total_uncorrected_errors", 2, 0);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_rereads_rewrites_warn_not_fail() {
        let mut attr = ScsiAttribute::new("read_errors_corrected_by_rereads_rewrites", 3, 0);
        attr.populate_status();
        assert!(attr.status.has(AttributeStatus::WARNING_SCRUTINY));
        assert!(!attr.status.has(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_informational_counter_never_evaluated() {
        let mut attr = ScsiAttribute::new("read_total_errors_corrected", 51111, -1);
        attr.populate_status();
        assert_eq!(attr.status, AttributeStatus::PASSED);
    }
}
