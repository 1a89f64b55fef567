//! Lenient field decoding for the backend's loosely typed JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Decimal fields arrive as numbers or as strings such as `"1000.00"`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A foreign key that is either a bare id or a nested object with an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related {
    Id(u64),
    Object(Map<String, Value>),
}

impl Related {
    pub fn id(&self) -> Option<u64> {
        match self {
            Related::Id(id) => Some(*id),
            Related::Object(fields) => match fields.get("id")? {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        }
    }

    /// A named field of the nested object, such as `name` or `price`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Related::Id(_) => None,
            Related::Object(fields) => fields.get(field),
        }
    }
}
