pub type AnyJson = serde_json::Value;
