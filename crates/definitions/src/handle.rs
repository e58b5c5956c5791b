//! Hot-reloadable access to the current registry.

use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::RegistryLoadError;
use crate::registry::Registry;

/// Shares one registry snapshot between concurrent retrievals.
///
/// A snapshot taken by a retrieval stays valid for its whole lifetime;
/// publishing a new registry only affects snapshots taken afterwards.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<Registry>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry currently published.
    pub fn snapshot(&self) -> Arc<Registry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the published registry, returning the previous one.
    pub fn publish(&self, registry: Registry) -> Arc<Registry> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(registry))
    }

    /// Load and publish the document at `path`.
    ///
    /// On error the current registry stays published.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<Registry>, RegistryLoadError> {
        let registry = Registry::load_path(path.as_ref())?;
        info!(
            path = ?path.as_ref(),
            variables = registry.variable_count(),
            models = registry.model_count(),
            "Published reloaded definitions"
        );
        self.publish(registry);
        Ok(self.snapshot())
    }
}

impl From<Registry> for RegistryHandle {
    fn from(registry: Registry) -> Self {
        Self::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ONE_VARIABLE: &str = r#"
variable:
  - frontend_api_name: dust
    backend_api_name: DUST
    form_label: Dust
    grib_representations:
      - {parameterNumber: 62001}
    netcdf: {varname: dust, species: Dust, shortname: DUST, units: x, scale: 1.0}
"#;

    #[test]
    fn test_snapshot_survives_publish() {
        let handle = RegistryHandle::new(Registry::default());
        let before = handle.snapshot();
        assert!(before.is_empty());

        handle.publish(Registry::load(ONE_VARIABLE).unwrap());
        assert!(before.is_empty());
        assert_eq!(handle.snapshot().variable_count(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        let bad = dir.path().join("bad.yaml");
        fs::write(&good, ONE_VARIABLE).unwrap();
        fs::write(&bad, "variable: {").unwrap();

        let handle = RegistryHandle::new(Registry::default());
        handle.reload(&good).unwrap();
        assert!(handle.reload(&bad).is_err());
        assert!(handle.snapshot().variable("dust").is_some());
    }
}
