use serde::Deserialize;

/// Names of the bookkeeping keys the cache reserves in its storage adapter.
///
/// A partition must not share its name with either key.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Key the validator token is persisted under.
    pub validator_key: String,

    /// Key written and removed once during initialization to check that storage accepts writes.
    pub probe_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            validator_key: "__validator".to_owned(),
            probe_key: "__storage_test__".to_owned(),
        }
    }
}

impl CacheConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = CacheConfig::from_json(r#"{"validator_key": "app-version"}"#).unwrap();
        assert_eq!(config.validator_key, "app-version");
        assert_eq!(config.probe_key, CacheConfig::default().probe_key);
    }
}
