//! Bridge configuration.

use tessera_core::{ApplyOptions, NestedDelete};

/// Configuration for a store bridge and its presence side channel.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// How `del` patches below a record root are handled.
    pub nested_delete: NestedDelete,
    /// Write the store's document records into a document that loads empty.
    pub seed_empty_document: bool,
    /// Minimum spacing of local presence broadcasts (in milliseconds).
    pub presence_frame_ms: u64,
    /// Peers silent for longer than this are pruned (in milliseconds).
    pub presence_timeout_ms: u64,
    /// How often stale peers are pruned and the local state re-announced
    /// (in milliseconds).
    pub presence_prune_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            nested_delete: NestedDelete::Reject,
            seed_empty_document: true,
            presence_frame_ms: 16,
            presence_timeout_ms: 30_000,
            presence_prune_interval_ms: 5_000,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Options for applying incoming patches.
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            nested_delete: self.nested_delete,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn nested_delete(mut self, policy: NestedDelete) -> Self {
        self.config.nested_delete = policy;
        self
    }

    pub fn seed_empty_document(mut self, enabled: bool) -> Self {
        self.config.seed_empty_document = enabled;
        self
    }

    pub fn presence_frame_interval(mut self, ms: u64) -> Self {
        self.config.presence_frame_ms = ms;
        self
    }

    pub fn presence_timeout(mut self, ms: u64) -> Self {
        self.config.presence_timeout_ms = ms;
        self
    }

    pub fn presence_prune_interval(mut self, ms: u64) -> Self {
        self.config.presence_prune_interval_ms = ms;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.nested_delete, NestedDelete::Reject);
        assert!(config.seed_empty_document);
        assert_eq!(config.presence_frame_ms, 16);
        assert_eq!(config.presence_timeout_ms, 30_000);
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::builder()
            .nested_delete(NestedDelete::Remove)
            .seed_empty_document(false)
            .presence_frame_interval(0)
            .presence_timeout(1_000)
            .presence_prune_interval(250)
            .build();

        assert_eq!(config.apply_options().nested_delete, NestedDelete::Remove);
        assert!(!config.seed_empty_document);
        assert_eq!(config.presence_frame_ms, 0);
        assert_eq!(config.presence_timeout_ms, 1_000);
        assert_eq!(config.presence_prune_interval_ms, 250);
    }
}
