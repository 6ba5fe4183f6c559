use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vstat_common::TagId;

/// Static properties of pulls for one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullSpec {
    /// The tag pulled from the data source.
    pub tag: TagId,
    /// Minimum time between two fresh pulls.
    pub cooldown: Duration,
    /// 1-based position of the field holding a UID that may need remapping.
    pub uid_field: Option<usize>,
    /// 1-based positions of the fields summed up when samples are merged after remapping.
    pub additive_fields: Vec<usize>,
}

impl PullSpec {
    /// Creates a spec without UID handling.
    pub fn new(tag: TagId, cooldown: Duration) -> Self {
        Self {
            tag,
            cooldown,
            uid_field: None,
            additive_fields: Vec::new(),
        }
    }
}

/// Pull properties of a single tag in the [`PullConfig`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TagConfig {
    /// Minimum time between two fresh pulls in milliseconds.
    ///
    /// Defaults to [`PullConfig::default_cooldown_ms`].
    pub cooldown_ms: Option<u64>,

    /// 1-based position of the UID field.
    ///
    /// Defaults to `None`, which disables isolated UID remapping for this tag.
    pub uid_field: Option<usize>,

    /// 1-based positions of fields that are summed when remapped samples collide.
    ///
    /// Defaults to an empty list, which only remaps UIDs without merging.
    pub additive_fields: Vec<usize>,
}

/// Parameters of the pull layer.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PullConfig {
    /// Cooldown in milliseconds for tags without an explicit cooldown.
    ///
    /// Defaults to `1000` milliseconds.
    pub default_cooldown_ms: u64,

    /// Minimum time in milliseconds between two sweeps of stale cache entries.
    ///
    /// Defaults to 5 minutes.
    pub cache_sweep_interval_ms: u64,

    /// Per-tag pull properties.
    pub tags: BTreeMap<TagId, TagConfig>,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            default_cooldown_ms: 1000,
            cache_sweep_interval_ms: 5 * 60 * 1000, // 5 minutes
            tags: BTreeMap::new(),
        }
    }
}

impl PullConfig {
    /// Returns the cooldown used for tags without an explicit cooldown.
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_millis(self.default_cooldown_ms)
    }

    /// Returns the minimum time between two cache sweeps.
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    /// Returns the pull spec of `tag`.
    ///
    /// Tags missing from the table are pulled with the default cooldown and without UID handling.
    pub fn spec(&self, tag: TagId) -> PullSpec {
        let Some(config) = self.tags.get(&tag) else {
            vstat_log::debug!(tag, "no pull config for tag, using default cooldown");
            return PullSpec::new(tag, self.default_cooldown());
        };

        PullSpec {
            tag,
            cooldown: config
                .cooldown_ms
                .map_or_else(|| self.default_cooldown(), Duration::from_millis),
            uid_field: config.uid_field,
            additive_fields: config.additive_fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: PullConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_cooldown(), Duration::from_secs(1));
        assert_eq!(config.cache_sweep_interval(), Duration::from_secs(300));
        assert!(config.tags.is_empty());
    }

    #[test]
    fn test_spec_from_table() {
        let config: PullConfig = serde_json::from_str(
            r#"{
                "default_cooldown_ms": 2000,
                "tags": {
                    "10000": {"cooldown_ms": 500, "uid_field": 1, "additive_fields": [3, 4]},
                    "10001": {"uid_field": 1}
                }
            }"#,
        )
        .unwrap();

        similar_asserts::assert_eq!(
            config.spec(10_000),
            PullSpec {
                tag: 10_000,
                cooldown: Duration::from_millis(500),
                uid_field: Some(1),
                additive_fields: vec![3, 4],
            }
        );
        assert_eq!(config.spec(10_001).cooldown, Duration::from_secs(2));
        assert_eq!(config.spec(10_001).uid_field, Some(1));
    }

    #[test]
    fn test_unknown_tag_uses_default() {
        let config = PullConfig::default();
        assert_eq!(
            config.spec(99),
            PullSpec::new(99, Duration::from_millis(1000))
        );
    }
}
