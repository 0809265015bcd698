use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A temperature sample, persisted on its own retention schedule so the
/// high-frequency series survives longer than full SMART points would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartTemperature {
    pub date: DateTime<Utc>,
    pub temp: i64,
}

impl SmartTemperature {
    pub fn flatten(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("temp".to_string(), Value::from(self.temp));
        fields
    }

    pub fn from_fields(date: DateTime<Utc>, fields: &Map<String, Value>) -> SmartTemperature {
        SmartTemperature {
            date,
            temp: fields.get("temp").and_then(Value::as_i64).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_round_trip() {
        let original = SmartTemperature {
            date: Utc::now(),
            temp: 38,
        };
        let fields = original.flatten();
        let restored = SmartTemperature::from_fields(original.date, &fields);
        assert_eq!(restored, original);
    }
}
