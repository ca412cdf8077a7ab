use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};

/// Registry of named detector backends.
///
/// One pipeline run borrows one backend mutably; the registry itself is not shared
/// between runs.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn DetectorBackend + 'static)> {
        self.backends.get_mut(name).map(|backend| backend.as_mut())
    }

    /// Get default backend.
    pub fn default_backend_mut(&mut self) -> Option<&mut (dyn DetectorBackend + 'static)> {
        let name = self.default_name.clone()?;
        self.get_mut(&name)
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability.
    pub fn backend_for_capability(
        &mut self,
        capability: DetectionCapability,
    ) -> Result<&mut (dyn DetectorBackend + 'static)> {
        let default_supports = self
            .default_name
            .as_ref()
            .and_then(|name| self.backends.get(name))
            .is_some_and(|backend| backend.supports(capability));

        let chosen = if default_supports {
            self.default_name.clone()
        } else {
            let mut names = self.list();
            names.retain(|name| {
                self.backends
                    .get(name)
                    .is_some_and(|backend| backend.supports(capability))
            });
            names.into_iter().next()
        };

        match chosen {
            Some(name) => self
                .get_mut(&name)
                .ok_or_else(|| anyhow!("backend '{}' disappeared from registry", name)),
            None => Err(anyhow!(
                "no registered backend supports capability {:?}",
                capability
            )),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use crate::detect::result::Detection;
    use crate::frame::Frame;

    struct DetectOnly;

    impl DetectorBackend for DetectOnly {
        fn name(&self) -> &'static str {
            "detect-only"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            matches!(capability, DetectionCapability::ObjectDetection)
        }

        fn detect_and_track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(vec![])
        }
    }

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(DetectOnly);
        registry.register(ScriptedBackend::empty());
        assert_eq!(registry.default_backend_mut().unwrap().name(), "detect-only");
        assert_eq!(registry.list(), vec!["detect-only", "scripted"]);
    }

    #[test]
    fn capability_lookup_skips_default_without_tracking() {
        let mut registry = BackendRegistry::new();
        registry.register(DetectOnly);
        registry.register(ScriptedBackend::empty());
        let backend = registry
            .backend_for_capability(DetectionCapability::Tracking)
            .unwrap();
        assert_eq!(backend.name(), "scripted");
    }

    #[test]
    fn capability_lookup_fails_when_unsupported() {
        let mut registry = BackendRegistry::new();
        registry.register(DetectOnly);
        assert!(registry
            .backend_for_capability(DetectionCapability::Tracking)
            .is_err());
    }

    #[test]
    fn set_default_rejects_unknown_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(DetectOnly);
        assert!(registry.set_default("replay").is_err());
        assert!(registry.set_default("detect-only").is_ok());
    }
}
