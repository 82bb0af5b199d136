use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::{CleanResult, Cleaner, CleanerOptions};
use crate::cleaners;
use crate::common::errors::Result;
use crate::common::exec::Context;
use crate::profiles::loader::OperationType;

/// Thread-safe catalog of cleaners keyed by name.
///
/// Mutations take the write lock, lookups the read lock. Iteration order is
/// unspecified; sort `names()` when order matters.
#[derive(Default)]
pub struct Registry {
    cleaners: RwLock<HashMap<String, Arc<dyn Cleaner>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort();
        f.debug_struct("Registry").field("cleaners", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cleaner, replacing any previous one under the same name.
    pub fn register(&self, name: impl Into<String>, cleaner: Arc<dyn Cleaner>) {
        let name = name.into();
        debug!(cleaner = %name, "registered");
        self.cleaners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, cleaner);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Cleaner>> {
        self.cleaners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn Cleaner>> {
        self.cleaners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.cleaners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.cleaners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Cleaner>> {
        self.cleaners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn clear(&self) {
        self.cleaners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Cleaners whose availability probe passes.
    ///
    /// Probes run on a snapshot, so the lock is not held across subprocesses.
    pub fn available(&self, ctx: &Context) -> Vec<Arc<dyn Cleaner>> {
        self.list()
            .into_iter()
            .filter(|c| c.is_available(ctx))
            .collect()
    }

    /// Run `clean` on every available cleaner, keyed by registered name.
    pub fn clean_all(&self, ctx: &Context) -> HashMap<String, Result<CleanResult>> {
        let snapshot: Vec<(String, Arc<dyn Cleaner>)> = self
            .cleaners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect();

        let mut results = HashMap::new();
        for (name, cleaner) in snapshot {
            if !cleaner.is_available(ctx) {
                debug!(cleaner = %name, "unavailable, skipping");
                continue;
            }
            let result = cleaner.clean(ctx);
            if let Err(e) = &result {
                warn!(cleaner = %name, code = %e.code(), "{}", e);
            }
            results.insert(name, result);
        }
        results
    }
}

/// Every concrete cleaner with default configuration.
pub fn default_registry() -> Registry {
    default_registry_with(false, false)
}

/// Every concrete cleaner, with `verbose` and `dry_run` threaded through.
pub fn default_registry_with(verbose: bool, dry_run: bool) -> Registry {
    registry_from(&CleanerOptions::new(verbose, dry_run))
}

/// Every concrete cleaner built from the given options.
pub fn registry_from(options: &CleanerOptions) -> Registry {
    let registry = Registry::new();
    for op in OperationType::ALL {
        match cleaners::build(op, options, None) {
            Ok(cleaner) => registry.register(op.as_str(), cleaner),
            Err(e) => warn!(cleaner = op.as_str(), "failed to construct: {}", e),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_every_type() {
        let registry = default_registry_with(false, true);
        assert_eq!(registry.count(), OperationType::ALL.len());
        for op in OperationType::ALL {
            let cleaner = registry.get(op.as_str()).unwrap();
            assert_eq!(cleaner.op_type(), op);
            assert_eq!(cleaner.name(), op.as_str());
        }
    }

    #[test]
    fn test_register_overwrites_and_unregister_removes() {
        let registry = default_registry_with(false, true);
        let docker = registry.get("docker").unwrap();
        registry.register("alias", Arc::clone(&docker));
        registry.register("alias", registry.get("cargo").unwrap());
        assert_eq!(registry.get("alias").unwrap().name(), "cargo");

        assert!(registry.unregister("alias").is_some());
        assert!(registry.get("alias").is_none());
        assert!(registry.unregister("alias").is_none());

        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(registry.names().is_empty());
    }
}
