use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DrivePulseError;

/// Aggregated device health, stored as a bit set so a device can carry both a
/// manufacturer SMART failure and an analyzer failure at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceStatus(pub i64);

impl DeviceStatus {
    pub const PASSED: DeviceStatus = DeviceStatus(0);
    pub const FAILED_SMART: DeviceStatus = DeviceStatus(1);
    pub const FAILED_SCRUTINY: DeviceStatus = DeviceStatus(2);

    pub fn has(self, check: DeviceStatus) -> bool {
        self.0 & check.0 != 0
    }

    pub fn with(self, add: DeviceStatus) -> DeviceStatus {
        DeviceStatus(self.0 | add.0)
    }

    pub fn is_passed(self) -> bool {
        self.0 == 0
    }
}

/// Per-attribute evaluation outcome. `WARNING_SCRUTINY` and `INVALID_VALUE`
/// exist only at the attribute level; device aggregation collapses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeStatus(pub i64);

impl AttributeStatus {
    pub const PASSED: AttributeStatus = AttributeStatus(0);
    pub const FAILED_SMART: AttributeStatus = AttributeStatus(1);
    pub const FAILED_SCRUTINY: AttributeStatus = AttributeStatus(2);
    pub const WARNING_SCRUTINY: AttributeStatus = AttributeStatus(4);
    pub const INVALID_VALUE: AttributeStatus = AttributeStatus(8);

    pub fn has(self, check: AttributeStatus) -> bool {
        self.0 & check.0 != 0
    }

    pub fn with(self, add: AttributeStatus) -> AttributeStatus {
        AttributeStatus(self.0 | add.0)
    }

    pub fn is_passed(self) -> bool {
        self.0 == 0
    }
}

/// Wire protocol of a monitored device. Serialized with the vendor-utility
/// spellings ("ATA", "NVMe", "SCSI") everywhere: JSON, database, metric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceProtocol {
    #[serde(rename = "ATA")]
    Ata,
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "SCSI")]
    Scsi,
}

impl DeviceProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceProtocol::Ata => "ATA",
            DeviceProtocol::Nvme => "NVMe",
            DeviceProtocol::Scsi => "SCSI",
        }
    }
}

impl fmt::Display for DeviceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceProtocol {
    type Err = DrivePulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ATA" => Ok(DeviceProtocol::Ata),
            "NVMe" => Ok(DeviceProtocol::Nvme),
            "SCSI" => Ok(DeviceProtocol::Scsi),
            other => Err(DrivePulseError::ValidationError(format!(
                "unknown device protocol: {other}"
            ))),
        }
    }
}

/// Which failure bits a device must carry before the notification gate fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusThreshold {
    Smart = 1,
    Scrutiny = 2,
    Both = 3,
}

impl StatusThreshold {
    pub fn from_setting(value: i64) -> StatusThreshold {
        match value {
            1 => StatusThreshold::Smart,
            2 => StatusThreshold::Scrutiny,
            _ => StatusThreshold::Both,
        }
    }
}

/// Whether notifications fire for every failing attribute or only for ones
/// whose metadata marks them critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilterAttributes {
    All = 0,
    Critical = 1,
}

impl StatusFilterAttributes {
    pub fn from_setting(value: i64) -> StatusFilterAttributes {
        match value {
            1 => StatusFilterAttributes::Critical,
            _ => StatusFilterAttributes::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_bits_combine() {
        let status = DeviceStatus::PASSED
            .with(DeviceStatus::FAILED_SMART)
            .with(DeviceStatus::FAILED_SCRUTINY);
        assert!(status.has(DeviceStatus::FAILED_SMART));
        assert!(status.has(DeviceStatus::FAILED_SCRUTINY));
        assert!(!status.is_passed());
    }

    #[test]
    fn test_device_status_passed_has_nothing() {
        assert!(DeviceStatus::PASSED.is_passed());
        assert!(!DeviceStatus::PASSED.has(DeviceStatus::FAILED_SMART));
    }

    #[test]
    fn test_attribute_status_warning_is_not_failure() {
        let status = AttributeStatus::WARNING_SCRUTINY;
        assert!(status.has(AttributeStatus::WARNING_SCRUTINY));
        assert!(!status.has(AttributeStatus::FAILED_SCRUTINY));
        assert!(!status.has(AttributeStatus::FAILED_SMART));
    }

    #[test]
    fn test_protocol_round_trip() {
        for proto in [DeviceProtocol::Ata, DeviceProtocol::Nvme, DeviceProtocol::Scsi] {
            assert_eq!(proto.as_str().parse::<DeviceProtocol>().unwrap(), proto);
        }
        assert!("SATA".parse::<DeviceProtocol>().is_err());
    }

    #[test]
    fn test_status_threshold_from_setting_defaults_to_both() {
        assert_eq!(StatusThreshold::from_setting(1), StatusThreshold::Smart);
        assert_eq!(StatusThreshold::from_setting(2), StatusThreshold::Scrutiny);
        assert_eq!(StatusThreshold::from_setting(3), StatusThreshold::Both);
        assert_eq!(StatusThreshold::from_setting(99), StatusThreshold::Both);
    }
}
