use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::status::AttributeStatus;

pub const REASON_IGNORED: &str = "Attribute ignored by user configuration";
pub const REASON_FORCED: &str = "Status forced by user configuration";
pub const REASON_WITHIN_CUSTOM_THRESHOLD: &str = "Within custom threshold";
pub const REASON_CUSTOM_THRESHOLD_EXCEEDED: &str = "Custom threshold exceeded";

/// What a matched override does to the evaluated attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    /// No action: only the custom thresholds (if any) apply.
    #[default]
    #[serde(rename = "")]
    #[serde(alias = "none")]
    None,
    Ignore,
    ForceStatus,
}

impl OverrideAction {
    pub fn parse(s: &str) -> Option<OverrideAction> {
        match s {
            "" => Some(OverrideAction::None),
            "ignore" => Some(OverrideAction::Ignore),
            "force_status" => Some(OverrideAction::ForceStatus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideAction::None => "",
            OverrideAction::Ignore => "ignore",
            OverrideAction::ForceStatus => "force_status",
        }
    }
}

/// A user rule that ignores, forces, or re-thresholds an attribute's
/// evaluated status. Config-file entries and database rows both convert into
/// this shape before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeOverride {
    pub protocol: String,
    pub attribute_id: String,
    /// Empty matches every device.
    #[serde(default)]
    pub wwn: String,
    #[serde(default)]
    pub action: OverrideAction,
    /// For `force_status`: "passed", "warn" or "failed".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub warn_above: Option<i64>,
    #[serde(default)]
    pub fail_above: Option<i64>,
}

impl AttributeOverride {
    /// Match requires equal protocol and attribute id; a nonempty override
    /// WWN must equal the query's, an empty one matches any device.
    pub fn matches(&self, protocol: &str, attribute_id: &str, wwn: &str) -> bool {
        if self.protocol != protocol {
            return false;
        }
        if self.attribute_id != attribute_id {
            return false;
        }
        if !self.wwn.is_empty() && self.wwn != wwn {
            return false;
        }
        true
    }

    pub fn forced_status(&self) -> AttributeStatus {
        match self.status.as_str() {
            "passed" => AttributeStatus::PASSED,
            "warn" => AttributeStatus::WARNING_SCRUTINY,
            "failed" => AttributeStatus::FAILED_SCRUTINY,
            _ => AttributeStatus::PASSED,
        }
    }
}

/// Outcome of applying a matched override to an attribute.
#[derive(Debug, Clone, Default)]
pub struct OverrideResult {
    pub should_ignore: bool,
    pub status: Option<AttributeStatus>,
    pub status_reason: String,
    pub warn_above: Option<i64>,
    pub fail_above: Option<i64>,
}

/// Decode overrides from the `smart.attribute_overrides` config key. A value
/// that cannot be decoded yields an empty list, never an error: a typo in the
/// config file must not take down ingest.
pub fn parse_config(config: &Config) -> Vec<AttributeOverride> {
    if config.smart.attribute_overrides.is_null() {
        return Vec::new();
    }
    serde_json::from_value(config.smart.attribute_overrides.clone()).unwrap_or_default()
}

/// First match wins in list order.
pub fn find_override<'a>(
    overrides: &'a [AttributeOverride],
    protocol: &str,
    attribute_id: &str,
    wwn: &str,
) -> Option<&'a AttributeOverride> {
    overrides
        .iter()
        .find(|o| o.matches(protocol, attribute_id, wwn))
}

/// Combine config-file overrides with database overrides. Entries are folded
/// into a map keyed by (protocol, attribute_id, wwn); database entries are
/// inserted last, so for any tuple present in both the database entry wins.
pub fn merge_overrides(
    config_overrides: Vec<AttributeOverride>,
    db_overrides: Vec<AttributeOverride>,
) -> Vec<AttributeOverride> {
    let mut merged: HashMap<(String, String, String), AttributeOverride> = HashMap::new();
    let mut order: Vec<(String, String, String)> = Vec::new();

    for o in config_overrides.into_iter().chain(db_overrides) {
        let key = (o.protocol.clone(), o.attribute_id.clone(), o.wwn.clone());
        if !merged.contains_key(&key) {
            order.push(key.clone());
        }
        merged.insert(key, o);
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .collect()
}

/// Apply the first matching override from a pre-merged list. Returns `None`
/// when no override matches.
pub fn apply_with_overrides(
    overrides: &[AttributeOverride],
    protocol: &str,
    attribute_id: &str,
    wwn: &str,
) -> Option<OverrideResult> {
    let matched = find_override(overrides, protocol, attribute_id, wwn)?;

    let mut result = OverrideResult::default();
    match matched.action {
        OverrideAction::Ignore => {
            result.should_ignore = true;
            result.status_reason = REASON_IGNORED.to_string();
        }
        OverrideAction::ForceStatus => {
            result.status = Some(matched.forced_status());
            result.status_reason = REASON_FORCED.to_string();
        }
        OverrideAction::None => {}
    }

    // Custom thresholds can combine with force_status or stand alone
    result.warn_above = matched.warn_above;
    result.fail_above = matched.fail_above;

    Some(result)
}

/// Evaluate custom thresholds against a value. `fail_above` takes precedence
/// over `warn_above`; both are strict comparisons. Returns `None` when no
/// threshold is exceeded.
pub fn apply_thresholds(result: &OverrideResult, value: i64) -> Option<AttributeStatus> {
    if let Some(fail_above) = result.fail_above {
        if value > fail_above {
            return Some(AttributeStatus::FAILED_SCRUTINY);
        }
    }
    if let Some(warn_above) = result.warn_above {
        if value > warn_above {
            return Some(AttributeStatus::WARNING_SCRUTINY);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn override_entry(
        protocol: &str,
        attribute_id: &str,
        wwn: &str,
        action: OverrideAction,
        status: &str,
    ) -> AttributeOverride {
        AttributeOverride {
            protocol: protocol.to_string(),
            attribute_id: attribute_id.to_string(),
            wwn: wwn.to_string(),
            action,
            status: status.to_string(),
            warn_above: None,
            fail_above: None,
        }
    }

    #[test]
    fn test_matches_requires_protocol_and_attribute() {
        let o = override_entry("ATA", "5", "", OverrideAction::Ignore, "");
        assert!(o.matches("ATA", "5", "0x5000cca264eb01d7"));
        assert!(!o.matches("NVMe", "5", "0x5000cca264eb01d7"));
        assert!(!o.matches("ATA", "197", "0x5000cca264eb01d7"));
    }

    #[test]
    fn test_matches_empty_wwn_matches_all_devices() {
        let any = override_entry("ATA", "5", "", OverrideAction::Ignore, "");
        assert!(any.matches("ATA", "5", "0xaaaa000000000001"));
        assert!(any.matches("ATA", "5", "0xbbbb000000000002"));

        let pinned = override_entry("ATA", "5", "0xaaaa000000000001", OverrideAction::Ignore, "");
        assert!(pinned.matches("ATA", "5", "0xaaaa000000000001"));
        assert!(!pinned.matches("ATA", "5", "0xbbbb000000000002"));
    }

    #[test]
    fn test_first_match_wins() {
        let overrides = vec![
            override_entry("ATA", "5", "", OverrideAction::Ignore, ""),
            override_entry("ATA", "5", "", OverrideAction::ForceStatus, "failed"),
        ];
        let matched = find_override(&overrides, "ATA", "5", "any").unwrap();
        assert_eq!(matched.action, OverrideAction::Ignore);
    }

    #[test]
    fn test_apply_ignore() {
        let overrides = vec![override_entry("ATA", "5", "", OverrideAction::Ignore, "")];
        let result = apply_with_overrides(&overrides, "ATA", "5", "w").unwrap();
        assert!(result.should_ignore);
        assert_eq!(result.status_reason, REASON_IGNORED);
        assert!(result.status.is_none());
    }

    #[test]
    fn test_apply_force_status() {
        let overrides = vec![override_entry("ATA", "5", "", OverrideAction::ForceStatus, "failed")];
        let result = apply_with_overrides(&overrides, "ATA", "5", "w").unwrap();
        assert!(!result.should_ignore);
        assert_eq!(result.status, Some(AttributeStatus::FAILED_SCRUTINY));
        assert_eq!(result.status_reason, REASON_FORCED);
    }

    #[test]
    fn test_apply_no_match_returns_none() {
        let overrides = vec![override_entry("ATA", "5", "", OverrideAction::Ignore, "")];
        assert!(apply_with_overrides(&overrides, "NVMe", "5", "w").is_none());
        assert!(apply_with_overrides(&overrides, "ATA", "197", "w").is_none());
    }

    #[test]
    fn test_apply_thresholds_strict_comparison() {
        let result = OverrideResult {
            warn_above: Some(10),
            fail_above: Some(50),
            ..Default::default()
        };
        // strictly greater-than, not greater-or-equal
        assert_eq!(apply_thresholds(&result, 10), None);
        assert_eq!(apply_thresholds(&result, 11), Some(AttributeStatus::WARNING_SCRUTINY));
        assert_eq!(apply_thresholds(&result, 50), Some(AttributeStatus::WARNING_SCRUTINY));
        assert_eq!(apply_thresholds(&result, 51), Some(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_apply_thresholds_fail_above_alone() {
        let result = OverrideResult {
            fail_above: Some(100),
            ..Default::default()
        };
        assert_eq!(apply_thresholds(&result, 100), None);
        assert_eq!(apply_thresholds(&result, 101), Some(AttributeStatus::FAILED_SCRUTINY));
    }

    #[test]
    fn test_merge_db_wins_over_config() {
        let config = vec![override_entry("ATA", "5", "", OverrideAction::Ignore, "")];
        let db = vec![override_entry("ATA", "5", "", OverrideAction::ForceStatus, "failed")];

        let merged = merge_overrides(config, db);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].action, OverrideAction::ForceStatus);
        assert_eq!(merged[0].status, "failed");
    }

    #[test]
    fn test_merge_distinct_tuples_are_kept() {
        let config = vec![
            override_entry("ATA", "5", "", OverrideAction::Ignore, ""),
            override_entry("ATA", "197", "", OverrideAction::Ignore, ""),
        ];
        let db = vec![override_entry("NVMe", "media_errors", "", OverrideAction::Ignore, "")];

        let merged = merge_overrides(config, db);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_wwn_is_part_of_the_key() {
        let config = vec![override_entry("ATA", "5", "", OverrideAction::Ignore, "")];
        let db = vec![override_entry(
            "ATA",
            "5",
            "0x5000cca264eb01d7",
            OverrideAction::ForceStatus,
            "warn",
        )];

        let merged = merge_overrides(config, db);
        assert_eq!(merged.len(), 2, "different wwn targets are distinct overrides");
    }

    #[test]
    fn test_parse_config_bad_shape_yields_empty() {
        let mut config = Config::default();
        config.smart.attribute_overrides = serde_json::json!("definitely not a list");
        assert!(parse_config(&config).is_empty());

        config.smart.attribute_overrides = serde_json::Value::Null;
        assert!(parse_config(&config).is_empty());
    }

    #[test]
    fn test_parse_config_decodes_entries() {
        let mut config = Config::default();
        config.smart.attribute_overrides = serde_json::json!([
            {"protocol": "ATA", "attribute_id": "199", "action": "ignore"},
            {"protocol": "NVMe", "attribute_id": "media_errors", "wwn": "0x5000cca264eb01d7",
             "warn_above": 5, "fail_above": 10}
        ]);

        let parsed = parse_config(&config);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].action, OverrideAction::Ignore);
        assert_eq!(parsed[1].warn_above, Some(5));
        assert_eq!(parsed[1].fail_above, Some(10));
        assert_eq!(parsed[1].action, OverrideAction::None);
    }
}
