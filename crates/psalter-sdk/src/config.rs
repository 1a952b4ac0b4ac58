//! Store configuration.

use serde::{Deserialize, Serialize};

/// When a once-only load counts as done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OncePolicy {
    /// Any settled attempt, failed or not, marks the mirror initialized.
    #[default]
    MarkOnAttempt,
    /// Only a successful load marks the mirror initialized; failures may retry.
    MarkOnSuccess,
}

impl std::str::FromStr for OncePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attempt" | "mark_on_attempt" => Ok(OncePolicy::MarkOnAttempt),
            "success" | "mark_on_success" => Ok(OncePolicy::MarkOnSuccess),
            other => Err(format!("unknown once policy: {}", other)),
        }
    }
}

/// Configuration shared by every store of a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size for list-backed mirrors.
    pub page_size: u32,
    pub once_policy: OncePolicy,
    /// Capacity of each mirror's change broadcast channel.
    pub event_capacity: usize,
    /// Sort applied to the setlist list until the user picks another.
    pub default_setlist_sort: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            once_policy: OncePolicy::MarkOnAttempt,
            event_capacity: 100,
            default_setlist_sort: "-service_date".to_string(),
        }
    }
}

/// Builder for store configuration.
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
        }
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size.max(1);
        self
    }

    pub fn once_policy(mut self, policy: OncePolicy) -> Self {
        self.config.once_policy = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn default_setlist_sort(mut self, sort: impl Into<String>) -> Self {
        self.config.default_setlist_sort = sort.into();
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = StoreConfigBuilder::new()
            .page_size(0)
            .once_policy(OncePolicy::MarkOnSuccess)
            .event_capacity(16)
            .default_setlist_sort("title")
            .build();

        assert_eq!(config.page_size, 1);
        assert_eq!(config.once_policy, OncePolicy::MarkOnSuccess);
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.default_setlist_sort, "title");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"page_size": 10, "once_policy": "mark_on_success"}"#).unwrap();

        assert_eq!(config.page_size, 10);
        assert_eq!(config.once_policy, OncePolicy::MarkOnSuccess);
        assert_eq!(config.event_capacity, 100);
    }

    #[test]
    fn test_once_policy_parse() {
        assert_eq!("attempt".parse::<OncePolicy>(), Ok(OncePolicy::MarkOnAttempt));
        assert!("never".parse::<OncePolicy>().is_err());
    }
}
