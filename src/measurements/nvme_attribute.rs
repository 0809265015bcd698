use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::AttributeStatus;
use crate::thresholds::{self, Ideal};

/// A field of the NVMe SMART / Health Information log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NvmeAttribute {
    pub attribute_id: String,
    pub value: i64,
    /// Evaluation threshold; -1 means informational only. For
    /// `available_spare` the drive-reported spare threshold is used.
    pub threshold: i64,
    pub transformed_value: i64,
    pub status: AttributeStatus,
    pub status_reason: String,
}

impl NvmeAttribute {
    pub fn new(attribute_id: &str, value: i64, threshold: i64) -> NvmeAttribute {
        NvmeAttribute {
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

        let metadata = thresholds::NVME_METADATA.get(self.attribute_id.as_str());
        let ideal = metadata.map(|m| m.ideal).unwrap_or(Ideal::Low);
        let critical = metadata.map(|m| m.critical).unwrap_or(false);

        match ideal {
            Ideal::High => {
                // e.g. available_spare: falling below the drive-reported
                // spare threshold is a failure
                if self.threshold > 0 && self.value < self.threshold {
                    self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                    self.status_reason = format!(
                        "Value {} dropped below manufacturer threshold ({})",
                        self.value, self.threshold
                    );
                }
            }
            Ideal::Low | Ideal::None => {
                let exceeded = if self.threshold == 0 {
                    self.value > 0
                } else {
                    self.value >= self.threshold
                };
                if exceeded {
                    if critical {
                        self.status = self.status.with(AttributeStatus::FAILED_SCRUTINY);
                        self.status_reason = format!(
                            "Value {} exceeds failure threshold ({})",
                            self.value, self.threshold
                        );
                    } else {
                        self.status = self.status.with(AttributeStatus::WARNING_SCRUTINY);
                        self.status_reason = format!(
                            "Value {} exceeds warning threshold ({})",
                            self.value, self.threshold
                        );
                    }
                }
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
