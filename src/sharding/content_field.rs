//! Content-field sharder: keys requests by one field of a JSON object body.

use serde::Deserialize;
use serde_json::Value;

use crate::sharding::{ShardError, ShardKey, Sharder};

/// Settings decoded from the route's sharder blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentFieldConfig {
    /// Dot-separated path, e.g. `customer.id` or `items.0.sku`.
    pub field: String,
}

/// Extracts the value at a field path and uses its canonical JSON form as the key.
#[derive(Debug, Clone)]
pub struct ContentFieldSharder {
    field: String,
    path: Vec<String>,
}

impl ContentFieldSharder {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        let path = field.split('.').map(str::to_string).collect();
        Self { field, path }
    }

    pub fn from_config(config: ContentFieldConfig) -> Self {
        Self::new(config.field)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.path.iter().try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

impl Sharder for ContentFieldSharder {
    fn derive_key(&self, body: &[u8]) -> Result<ShardKey, ShardError> {
        let root: Value =
            serde_json::from_slice(body).map_err(|e| ShardError::ParseError(e.to_string()))?;

        if !root.is_object() {
            return Err(ShardError::ParseError("body is not a JSON object".to_string()));
        }

        match self.lookup(&root) {
            None | Some(Value::Null) => Err(ShardError::MissingField(self.field.clone())),
            // serde_json maps keep keys sorted, so this output is canonical
            Some(value) => serde_json::to_vec(value)
                .map(ShardKey::new)
                .map_err(|e| ShardError::ParseError(e.to_string())),
        }
    }
}
