use std::sync::Arc;

use ess_metrics::{EconomyInfo, FeatureSettings, MetricsResult, Module, ServerStats};
use ess_storage::{JsonFileBackend, PersistenceBackend};

use crate::config::ServerConfig;
use crate::document::Document;

pub const USER_NAMESPACE: &str = "user";
pub const JAIL_NAMESPACE: &str = "jail";
pub const KIT_NAMESPACE: &str = "kit";
pub const WARP_NAMESPACE: &str = "warp";

/// Server statistics answered from the document store on disk.
pub struct StoreStats {
    backend: Arc<JsonFileBackend<Document>>,
    server: ServerConfig,
}

impl StoreStats {
    pub fn new(backend: Arc<JsonFileBackend<Document>>, server: ServerConfig) -> Self {
        Self { backend, server }
    }

    fn count(&self, namespace: &str) -> MetricsResult<u64> {
        let keys = self.backend.keys()?;
        Ok(keys.iter().filter(|k| k.namespace() == namespace).count() as u64)
    }
}

impl ServerStats for StoreStats {
    fn is_module_enabled(&self, module: Module) -> bool {
        self.server.modules.contains(&module)
    }

    fn locale_language(&self) -> String {
        self.server.locale.clone()
    }

    fn unique_accounts(&self) -> MetricsResult<u64> {
        self.count(USER_NAMESPACE)
    }

    fn jail_count(&self) -> MetricsResult<u64> {
        self.count(JAIL_NAMESPACE)
    }

    /// `None` until the kit namespace has been created on disk.
    fn kit_count(&self) -> MetricsResult<Option<u64>> {
        if !self.backend.root().join(KIT_NAMESPACE).is_dir() {
            return Ok(None);
        }
        self.count(KIT_NAMESPACE).map(Some)
    }

    fn warp_count(&self) -> MetricsResult<u64> {
        self.count(WARP_NAMESPACE)
    }

    fn features(&self) -> FeatureSettings {
        FeatureSettings::default()
    }

    fn economy(&self) -> Option<EconomyInfo> {
        None
    }

    fn permissions_handler(&self) -> String {
        self.server.permissions_handler.clone()
    }

    fn enabled_signs(&self) -> Vec<String> {
        self.server.signs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ess_storage::{Revision, StorageKey, Versioned};

    fn save(backend: &JsonFileBackend<Document>, key: &str) {
        let key: StorageKey = key.parse().unwrap();
        let doc = Document::default();
        backend
            .save(&key, Versioned::new(Revision::zero().next(), &doc), Revision::zero())
            .unwrap();
    }

    #[test]
    fn counts_by_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(JsonFileBackend::<Document>::open(dir.path()).unwrap());
        save(&backend, "user:alice");
        save(&backend, "user:bob");
        save(&backend, "warp:spawn");

        let stats = StoreStats::new(backend.clone(), ServerConfig::default());
        assert_eq!(stats.unique_accounts().unwrap(), 2);
        assert_eq!(stats.warp_count().unwrap(), 1);
        assert_eq!(stats.jail_count().unwrap(), 0);
        assert_eq!(stats.kit_count().unwrap(), None);

        save(&backend, "kit:starter");
        assert_eq!(stats.kit_count().unwrap(), Some(1));
    }

    #[test]
    fn static_facts_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(JsonFileBackend::<Document>::open(dir.path()).unwrap());
        let server = ServerConfig {
            signs: vec!["Heal".into()],
            ..Default::default()
        };
        let stats = StoreStats::new(backend, server);
        assert!(stats.is_module_enabled(Module::Essentials));
        assert!(!stats.is_module_enabled(Module::EssentialsGeoIP));
        assert_eq!(stats.enabled_signs(), vec!["Heal"]);
        assert_eq!(stats.locale_language(), "English");
    }
}
