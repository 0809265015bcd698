use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::status::DeviceProtocol;

/// Values at or below this are treated as plausible failure counts; anything
/// above it on an "ideal: low" attribute is corrupted vendor data and is
/// flagged `invalid_value` instead of failing the device.
pub const MAX_REASONABLE_FAILURE_COUNT: i64 = 1_000_000;

/// Which direction is healthy for an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ideal {
    Low,
    High,
    None,
}

/// How the UI should render the attribute value; carried through storage so
/// the display layer never needs the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayType {
    Normalized,
    Raw,
    TransformedRaw,
    Hours,
}

/// An observed-failure-rate bucket derived from large-population drive
/// statistics: drives whose raw value fell in `[low, high]` failed at
/// `annual_failure_rate` within a year. `error_interval` is the confidence
/// interval around the rate; when the point estimate is zero but the interval
/// is not, the interval midpoint is used instead.
#[derive(Debug, Clone)]
pub struct ObservedThreshold {
    pub low: i64,
    pub high: i64,
    pub annual_failure_rate: f64,
    pub error_interval: [f64; 2],
}

pub type TransformFn = fn(value: i64, raw_value: i64, raw_string: &str) -> i64;

#[derive(Debug, Clone)]
pub struct AtaAttributeMetadata {
    pub id: i32,
    pub display_name: &'static str,
    pub ideal: Ideal,
    pub critical: bool,
    pub display_type: DisplayType,
    pub transform: Option<TransformFn>,
    pub observed_thresholds: Vec<ObservedThreshold>,
    /// Cumulative counters carry history forever; suppress warnings when the
    /// value has not advanced since the previous submission.
    pub use_delta_evaluation: bool,
}

/// Metadata for string-keyed attributes (ATA device statistics, NVMe health
/// fields, SCSI error-log entries).
#[derive(Debug, Clone)]
pub struct KeyedAttributeMetadata {
    pub attribute_id: &'static str,
    pub display_name: &'static str,
    pub ideal: Ideal,
    pub critical: bool,
    /// Fixed evaluation threshold. `None` means informational only.
    pub threshold: Option<i64>,
    /// Error counters without a fixed fail threshold: non-zero warns, never
    /// fails outright.
    pub error_count: bool,
}

/// Canonicalise ATA attribute 9 (and 240) to integer hours. smartctl emits
/// several raw formats in the wild:
///   "1730"                 plain hours
///   "1730h+05m+02.453s"    hours+minutes+seconds
///   "103800 (1730 hours)"  minutes with converted hours in parens
///   "2725 (151 234 0)"     hours with packed min/max bytes in parens
/// and some firmware packs flag bytes above bit 32 of the raw value.
pub fn transform_power_on_hours(_value: i64, raw_value: i64, raw_string: &str) -> i64 {
    let s = raw_string.trim();

    if let Some(idx) = s.find("h+") {
        if let Ok(hours) = s[..idx].parse::<i64>() {
            return hours;
        }
    }

    if let (Some(open), Some(close)) = (s.find('('), s.find(')')) {
        if close > open {
            let inner = &s[open + 1..close];
            if let Some(hours_part) = inner.strip_suffix(" hours") {
                if let Ok(hours) = hours_part.trim().parse::<i64>() {
                    return hours;
                }
            }
        }
    }

    let leading: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !leading.is_empty() {
        if let Ok(hours) = leading.parse::<i64>() {
            return hours;
        }
    }

    if raw_value > 0xFFFF_FFFF {
        return raw_value & 0xFFFF_FFFF;
    }
    raw_value
}

fn bucket(low: i64, high: i64, rate: f64) -> ObservedThreshold {
    ObservedThreshold {
        low,
        high,
        annual_failure_rate: rate,
        error_interval: [0.0, 0.0],
    }
}

pub static ATA_METADATA: Lazy<HashMap<i32, AtaAttributeMetadata>> = Lazy::new(|| {
    let mut m = HashMap::new();

    let mut insert = |meta: AtaAttributeMetadata| {
        m.insert(meta.id, meta);
    };

    insert(AtaAttributeMetadata {
        id: 1,
        display_name: "Read Error Rate",
        ideal: Ideal::Low,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.027),
            bucket(1, 16, 0.043),
            bucket(17, 3756, 0.067),
            bucket(3757, 56176, 0.084),
            bucket(56177, i64::MAX, 0.106),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 3,
        display_name: "Spin-Up Time",
        ideal: Ideal::Low,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 4,
        display_name: "Start/Stop Count",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 5,
        display_name: "Reallocated Sectors Count",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.027),
            bucket(1, 4, 0.104),
            bucket(5, 26, 0.131),
            bucket(27, 98, 0.148),
            bucket(99, 252, 0.186),
            bucket(253, 467, 0.229),
            bucket(468, i64::MAX, 0.316),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 7,
        display_name: "Seek Error Rate",
        ideal: Ideal::Low,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.031),
            bucket(1, i64::MAX, 0.089),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 9,
        display_name: "Power-On Hours",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Hours,
        transform: Some(transform_power_on_hours),
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 10,
        display_name: "Spin Retry Count",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.028),
            bucket(1, i64::MAX, 0.232),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 12,
        display_name: "Power Cycle Count",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 177,
        display_name: "Wear Leveling Count",
        ideal: Ideal::High,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 184,
        display_name: "End-to-End Error",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.027),
            bucket(1, i64::MAX, 0.221),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 187,
        display_name: "Reported Uncorrectable Errors",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.024),
            bucket(1, 2, 0.170),
            bucket(3, 12, 0.213),
            bucket(13, 35, 0.288),
            bucket(36, i64::MAX, 0.373),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 188,
        display_name: "Command Timeout",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.029),
            bucket(1, 13, 0.118),
            bucket(14, 78, 0.162),
            bucket(79, i64::MAX, 0.268),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 190,
        display_name: "Airflow Temperature",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 192,
        display_name: "Unsafe Shutdown Count",
        ideal: Ideal::Low,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 193,
        display_name: "Load Cycle Count",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 194,
        display_name: "Temperature",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 196,
        display_name: "Reallocation Event Count",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.026),
            bucket(1, 2, 0.093),
            bucket(3, i64::MAX, 0.205),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 197,
        display_name: "Current Pending Sector Count",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.025),
            bucket(1, 1, 0.183),
            bucket(2, 7, 0.224),
            bucket(8, 29, 0.293),
            bucket(30, i64::MAX, 0.366),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 198,
        display_name: "Uncorrectable Sector Count",
        ideal: Ideal::Low,
        critical: true,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.026),
            bucket(1, 1, 0.203),
            bucket(2, i64::MAX, 0.304),
        ],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 199,
        display_name: "UltraDMA CRC Error Count",
        ideal: Ideal::Low,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![
            bucket(0, 0, 0.030),
            bucket(1, 2, 0.102),
            bucket(3, 12, 0.124),
            bucket(13, 35, 0.174),
            bucket(36, i64::MAX, 0.237),
        ],
        use_delta_evaluation: true,
    });
    insert(AtaAttributeMetadata {
        id: 231,
        display_name: "Life Left",
        ideal: Ideal::High,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 232,
        display_name: "Endurance Remaining",
        ideal: Ideal::High,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 233,
        display_name: "Media Wearout Indicator",
        ideal: Ideal::High,
        critical: false,
        display_type: DisplayType::Normalized,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 240,
        display_name: "Head Flying Hours",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Hours,
        transform: Some(transform_power_on_hours),
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 241,
        display_name: "Total LBAs Written",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });
    insert(AtaAttributeMetadata {
        id: 242,
        display_name: "Total LBAs Read",
        ideal: Ideal::None,
        critical: false,
        display_type: DisplayType::Raw,
        transform: None,
        observed_thresholds: vec![],
        use_delta_evaluation: false,
    });

    m
});

pub static DEVSTAT_METADATA: Lazy<HashMap<&'static str, KeyedAttributeMetadata>> = Lazy::new(|| {
    let entries = [
        KeyedAttributeMetadata {
            attribute_id: "devstat_1_8",
            display_name: "Lifetime Power-On Resets",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_1_16",
            display_name: "Power-On Hours",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_1_24",
            display_name: "Logical Sectors Written",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_1_40",
            display_name: "Logical Sectors Read",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_3_32",
            display_name: "Number of Reallocated Logical Sectors",
            ideal: Ideal::Low,
            critical: true,
            threshold: None,
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_3_48",
            display_name: "Number of Mechanical Start Failures",
            ideal: Ideal::Low,
            critical: true,
            threshold: None,
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_4_8",
            display_name: "Number of Reported Uncorrectable Errors",
            ideal: Ideal::Low,
            critical: true,
            threshold: None,
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_4_16",
            display_name: "Resets Between Command Acceptance and Completion",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_5_8",
            display_name: "Current Temperature",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_5_88",
            display_name: "Time in Over-Temperature",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "devstat_7_8",
            display_name: "Percentage Used Endurance Indicator",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(100),
            error_count: false,
        },
    ];
    entries
        .into_iter()
        .map(|meta| (meta.attribute_id, meta))
        .collect()
});

pub static NVME_METADATA: Lazy<HashMap<&'static str, KeyedAttributeMetadata>> = Lazy::new(|| {
    let entries = [
        KeyedAttributeMetadata {
            attribute_id: "critical_warning",
            display_name: "Critical Warning",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(0),
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "temperature",
            display_name: "Temperature",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "available_spare",
            display_name: "Available Spare",
            ideal: Ideal::High,
            critical: true,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "percentage_used",
            display_name: "Percentage Used",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(100),
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "data_units_read",
            display_name: "Data Units Read",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "data_units_written",
            display_name: "Data Units Written",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "host_reads",
            display_name: "Host Reads",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "host_writes",
            display_name: "Host Writes",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "controller_busy_time",
            display_name: "Controller Busy Time",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "power_cycles",
            display_name: "Power Cycles",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "power_on_hours",
            display_name: "Power-On Hours",
            ideal: Ideal::None,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "unsafe_shutdowns",
            display_name: "Unsafe Shutdowns",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "media_errors",
            display_name: "Media and Data Integrity Errors",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(0),
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "num_err_log_entries",
            display_name: "Error Information Log Entries",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "warning_temp_time",
            display_name: "Warning Composite Temperature Time",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "critical_comp_time",
            display_name: "Critical Composite Temperature Time",
            ideal: Ideal::Low,
            critical: false,
            threshold: None,
            error_count: false,
        },
    ];
    entries
        .into_iter()
        .map(|meta| (meta.attribute_id, meta))
        .collect()
});

pub static SCSI_METADATA: Lazy<HashMap<&'static str, KeyedAttributeMetadata>> = Lazy::new(|| {
    let entries = [
        KeyedAttributeMetadata {
            attribute_id: "scsi_grown_defect_list",
            display_name: "Grown Defect List",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(0),
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "read_errors_corrected_by_rereads_rewrites",
            display_name: "Read Errors Corrected by ReReads/ReWrites",
            ideal: Ideal::Low,
            critical: false,
            threshold: Some(0),
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "read_total_uncorrected_errors",
            display_name: "Read Total Uncorrected Errors",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(0),
            error_count: false,
        },
        KeyedAttributeMetadata {
            attribute_id: "write_errors_corrected_by_rereads_rewrites",
            display_name: "Write Errors Corrected by ReReads/ReWrites",
            ideal: Ideal::Low,
            critical: false,
            threshold: Some(0),
            error_count: true,
        },
        KeyedAttributeMetadata {
            attribute_id: "write_total_uncorrected_errors",
            display_name: "Write Total Uncorrected Errors",
            ideal: Ideal::Low,
            critical: true,
            threshold: Some(0),
            error_count: false,
        },
    ];
    entries
        .into_iter()
        .map(|meta| (meta.attribute_id, meta))
        .collect()
});

/// True when the attribute's metadata marks it critical. Used by the
/// notification gate's `critical` status filter.
pub fn is_critical_attribute(protocol: DeviceProtocol, attribute_id: &str) -> bool {
    match protocol {
        DeviceProtocol::Ata => {
            if attribute_id.starts_with("devstat_") {
                DEVSTAT_METADATA
                    .get(attribute_id)
                    .map(|m| m.critical)
                    .unwrap_or(false)
            } else {
                attribute_id
                    .parse::<i32>()
                    .ok()
                    .and_then(|id| ATA_METADATA.get(&id))
                    .map(|m| m.critical)
                    .unwrap_or(false)
            }
        }
        DeviceProtocol::Nvme => NVME_METADATA
            .get(attribute_id)
            .map(|m| m.critical)
            .unwrap_or(false),
        DeviceProtocol::Scsi => SCSI_METADATA
            .get(attribute_id)
            .map(|m| m.critical)
            .unwrap_or(false),
    }
}
