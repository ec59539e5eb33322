//! Repository location registry.
//!
//! The registry is an explicitly constructed service: the orchestrator builds
//! one, registers locations in it and hands `Arc<RepositoryLocation>`s to the
//! operations it creates. Removing a location disposes its warm proxies.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::connector::ConnectorFactory;
use crate::error::{Error, Result};
use crate::location::{LocationSettings, RepositoryLocation, DEFAULT_PROXY_CACHE_SIZE};

/// Owns the repository locations known to one orchestrator.
pub struct LocationRegistry {
    factory: Arc<dyn ConnectorFactory>,
    cache_size: usize,
    locations: RwLock<BTreeMap<String, Arc<RepositoryLocation>>>,
}

impl LocationRegistry {
    /// Creates an empty registry whose locations create proxies with `factory`.
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            factory,
            cache_size: DEFAULT_PROXY_CACHE_SIZE,
            locations: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sets the idle proxy cache size of locations added afterwards.
    #[must_use]
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Registers a location under `id`.
    pub fn add(&self, id: &str, settings: LocationSettings) -> Result<Arc<RepositoryLocation>> {
        let mut locations = self.locations.write().map_err(|_| Error::LockPoisoned {
            context: "location registry".to_string(),
        })?;
        if locations.contains_key(id) {
            return Err(Error::DuplicateLocation { id: id.to_string() });
        }
        let location = Arc::new(
            RepositoryLocation::new(id, settings, self.factory.clone())?
                .with_cache_size(self.cache_size),
        );
        locations.insert(id.to_string(), location.clone());
        debug!("Registered location {}", id);
        Ok(location)
    }

    pub fn get(&self, id: &str) -> Result<Arc<RepositoryLocation>> {
        let locations = self.locations.read().map_err(|_| Error::LockPoisoned {
            context: "location registry".to_string(),
        })?;
        locations
            .get(id)
            .cloned()
            .ok_or_else(|| Error::LocationNotFound { id: id.to_string() })
    }

    /// Unregisters a location and disposes its warm proxies.
    ///
    /// Operations still holding the location keep it alive; their leased
    /// proxies are disposed when released.
    pub fn remove(&self, id: &str) -> Result<()> {
        let removed = self
            .locations
            .write()
            .map_err(|_| Error::LockPoisoned {
                context: "location registry".to_string(),
            })?
            .remove(id);
        match removed {
            Some(location) => {
                location.dispose();
                Ok(())
            }
            None => Err(Error::LocationNotFound { id: id.to_string() }),
        }
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.locations
            .read()
            .map(|locations| locations.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Disposes the warm proxies of every location. Locations stay registered.
    pub fn dispose_all(&self) {
        if let Ok(locations) = self.locations.read() {
            for location in locations.values() {
                location.dispose();
            }
        }
    }
}

impl Drop for LocationRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
