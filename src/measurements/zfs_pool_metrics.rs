use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Periodic per-pool metrics sampled from `zpool` output on the collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZfsPoolMetrics {
    pub date: DateTime<Utc>,
    pub pool_guid: String,

    pub health: String,
    pub capacity_percent: f64,
    pub fragmentation_percent: f64,
    pub size_bytes: i64,
    pub allocated_bytes: i64,
    pub free_bytes: i64,

    pub read_errors: i64,
    pub write_errors: i64,
    pub checksum_errors: i64,

    pub scrub_state: String,
    pub scrub_percent_complete: f64,
}

impl ZfsPoolMetrics {
    pub fn flatten(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("health".to_string(), Value::from(self.health.clone()));
        fields.insert("capacity_percent".to_string(), Value::from(self.capacity_percent));
        fields.insert(
            "fragmentation_percent".to_string(),
            Value::from(self.fragmentation_percent),
        );
        fields.insert("size_bytes".to_string(), Value::from(self.size_bytes));
        fields.insert("allocated_bytes".to_string(), Value::from(self.allocated_bytes));
        fields.insert("free_bytes".to_string(), Value::from(self.free_bytes));
        fields.insert("read_errors".to_string(), Value::from(self.read_errors));
        fields.insert("write_errors".to_string(), Value::from(self.write_errors));
        fields.insert("checksum_errors".to_string(), Value::from(self.checksum_errors));
        fields.insert("scrub_state".to_string(), Value::from(self.scrub_state.clone()));
        fields.insert(
            "scrub_percent_complete".to_string(),
            Value::from(self.scrub_percent_complete),
        );
        fields
    }

    pub fn from_fields(guid: &str, date: DateTime<Utc>, fields: &Map<String, Value>) -> ZfsPoolMetrics {
        let f = |key: &str| fields.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let i = |key: &str| fields.get(key).and_then(Value::as_i64).unwrap_or(0);
        let s = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        ZfsPoolMetrics {
            date,
            pool_guid: guid.to_string(),
            health: s("health"),
            capacity_percent: f("capacity_percent"),
            fragmentation_percent: f("fragmentation_percent"),
            size_bytes: i("size_bytes"),
            allocated_bytes: i("allocated_bytes"),
            free_bytes: i("free_bytes"),
            read_errors: i("read_errors"),
            write_errors: i("write_errors"),
            checksum_errors: i("checksum_errors"),
            scrub_state: s("scrub_state"),
            scrub_percent_complete: f("scrub_percent_complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_round_trip() {
        let original = ZfsPoolMetrics {
            date: Utc::now(),
            pool_guid: "12345678901234567890".to_string(),
            health: "ONLINE".to_string(),
            capacity_percent: 61.5,
            read_errors: 0,
            write_errors: 0,
            checksum_errors: 2,
            scrub_state: "finished".to_string(),
            scrub_percent_complete: 100.0,
            ..Default::default()
        };

        let fields = original.flatten();
        let restored =
            ZfsPoolMetrics::from_fields("12345678901234567890", original.date, &fields);
        assert_eq!(restored.health, "ONLINE");
        assert_eq!(restored.capacity_percent, 61.5);
        assert_eq!(restored.checksum_errors, 2);
        assert_eq!(restored.scrub_state, "finished");
    }
}
