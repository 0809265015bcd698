mod ata_attribute;
mod ata_devstat_attribute;
mod nvme_attribute;
mod performance;
mod scsi_attribute;
mod smart;
mod temperature;
mod zfs_pool_metrics;

pub use ata_attribute::AtaAttribute;
pub use ata_devstat_attribute::AtaDevstatAttribute;
pub use nvme_attribute::NvmeAttribute;
pub use performance::{Performance, PerformanceBaseline};
pub use scsi_attribute::ScsiAttribute;
pub use smart::Smart;
pub use temperature::SmartTemperature;
pub use zfs_pool_metrics::ZfsPoolMetrics;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::{AttributeStatus, DeviceProtocol};

/// Protocol-specific attribute record. A tagged union rather than a trait
/// object so delta evaluation and storage can reach variant fields directly.
/// All variants share the capability set {flatten, inflate, status,
/// transformed_value, populate_status}.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmartAttribute {
    Ata(AtaAttribute),
    AtaDevstat(AtaDevstatAttribute),
    Nvme(NvmeAttribute),
    Scsi(ScsiAttribute),
}

impl SmartAttribute {
    pub fn status(&self) -> AttributeStatus {
        match self {
            SmartAttribute::Ata(a) => a.status,
            SmartAttribute::AtaDevstat(a) => a.status,
            SmartAttribute::Nvme(a) => a.status,
            SmartAttribute::Scsi(a) => a.status,
        }
    }

    pub fn set_status(&mut self, status: AttributeStatus, reason: &str) {
        match self {
            SmartAttribute::Ata(a) => {
                a.status = status;
                a.status_reason = reason.to_string();
            }
            SmartAttribute::AtaDevstat(a) => {
                a.status = status;
                a.status_reason = reason.to_string();
            }
            SmartAttribute::Nvme(a) => {
                a.status = status;
                a.status_reason = reason.to_string();
            }
            SmartAttribute::Scsi(a) => {
                a.status = status;
                a.status_reason = reason.to_string();
            }
        }
    }

    pub fn status_reason(&self) -> &str {
        match self {
            SmartAttribute::Ata(a) => &a.status_reason,
            SmartAttribute::AtaDevstat(a) => &a.status_reason,
            SmartAttribute::Nvme(a) => &a.status_reason,
            SmartAttribute::Scsi(a) => &a.status_reason,
        }
    }

    pub fn transformed_value(&self) -> i64 {
        match self {
            SmartAttribute::Ata(a) => a.transformed_value,
            SmartAttribute::AtaDevstat(a) => a.transformed_value,
            SmartAttribute::Nvme(a) => a.transformed_value,
            SmartAttribute::Scsi(a) => a.transformed_value,
        }
    }

    pub fn flatten(&self) -> Map<String, Value> {
        match self {
            SmartAttribute::Ata(a) => a.flatten(),
            SmartAttribute::AtaDevstat(a) => a.flatten(),
            SmartAttribute::Nvme(a) => a.flatten(),
            SmartAttribute::Scsi(a) => a.flatten(),
        }
    }

    pub fn inflate(&mut self, key: &str, value: &Value) {
        match self {
            SmartAttribute::Ata(a) => a.inflate(key, value),
            SmartAttribute::AtaDevstat(a) => a.inflate(key, value),
            SmartAttribute::Nvme(a) => a.inflate(key, value),
            SmartAttribute::Scsi(a) => a.inflate(key, value),
        }
    }

    /// Create the empty variant appropriate for a stored attribute id,
    /// used when re-inflating points read back from the metrics store.
    pub fn empty_for(protocol: DeviceProtocol, attribute_id: &str) -> SmartAttribute {
        match protocol {
            DeviceProtocol::Ata => {
                if attribute_id.starts_with("devstat_") {
                    SmartAttribute::AtaDevstat(AtaDevstatAttribute::default())
                } else {
                    SmartAttribute::Ata(AtaAttribute::default())
                }
            }
            DeviceProtocol::Nvme => SmartAttribute::Nvme(NvmeAttribute::default()),
            DeviceProtocol::Scsi => SmartAttribute::Scsi(ScsiAttribute::default()),
        }
    }
}
