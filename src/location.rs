//! # Repository Locations and Proxy Leasing
//!
//! A [`RepositoryLocation`] is the identity and settings of one remote
//! repository endpoint, and the owner of a small pool of native proxies for
//! it. Native proxies are expensive to create, so they are leased rather than
//! owned:
//!
//! - [`RepositoryLocation::acquire`] returns a [`ProxyLease`]. The proxy is
//!   created lazily on first use, or taken from the idle cache.
//! - Dropping the lease releases it. This runs on every exit path, including
//!   `?` propagation and unwinding, so acquire/release pairing is structural.
//! - Leasing is reentrant per thread: a thread that already holds a lease on
//!   this location gets the same proxy back and only a reference count moves.
//! - When a thread's last lease is released, the proxy goes back to the idle
//!   cache (bounded by the cache size) and stays warm. It is only torn down on
//!   cache overflow, [`reconfigure`](RepositoryLocation::reconfigure) or
//!   [`dispose`](RepositoryLocation::dispose).
//!
//! All pool bookkeeping, including lazy creation, is serialized per location
//! by one mutex, so independent composites may lease concurrently.
//!
//! ## Example
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//! use svn_ops::location::{LocationSettings, RepositoryLocation};
//! use svn_ops::memory::MemoryConnectorFactory;
//!
//! let factory = Arc::new(MemoryConnectorFactory::new());
//! factory.repository().add_remote("svn://example.com/repo");
//! let location = RepositoryLocation::new(
//!     "main",
//!     LocationSettings::new("svn://example.com/repo"),
//!     factory,
//! )
//! .unwrap();
//!
//! {
//!     let proxy = location.acquire().unwrap();
//!     proxy
//!         .mkdir(&["svn://example.com/repo/trunk".to_string()], "init", false)
//!         .unwrap();
//! } // released here
//!
//! let stats = location.stats();
//! assert_eq!(stats.acquired, stats.released);
//! assert_eq!(stats.idle, 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use log::{debug, error};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connector::{ConnectorFactory, NativeConnector, TaggedConnector};
use crate::error::Result;

/// Number of idle proxies kept warm per location.
pub const DEFAULT_PROXY_CACHE_SIZE: usize = 5;

/// SSL client settings.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SslSettings {
    pub verify_hostname: bool,
    pub client_certificate: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl fmt::Debug for SslSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslSettings")
            .field("verify_hostname", &self.verify_hostname)
            .field("client_certificate", &self.client_certificate)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// SSH tunnel settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshSettings {
    pub port: u16,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: 22,
            private_key: None,
            passphrase: None,
        }
    }
}

impl fmt::Debug for SshSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSettings")
            .field("port", &self.port)
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a connector factory needs to build a proxy for a location.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationSettings {
    /// Repository root URL.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: SslSettings,
    #[serde(default)]
    pub ssh: SshSettings,
}

impl LocationSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            ssl: SslSettings::default(),
            ssh: SshSettings::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: Option<&str>) -> Self {
        self.username = Some(username.to_string());
        self.password = password.map(str::to_string);
        self
    }

    /// Checks that the root URL parses.
    pub fn validate(&self) -> Result<Url> {
        Ok(Url::parse(&self.url)?)
    }
}

impl fmt::Debug for LocationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl", &self.ssl)
            .field("ssh", &self.ssh)
            .finish()
    }
}

/// Counters describing a location's proxy pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Proxies created by the factory.
    pub created: u64,
    /// Proxies torn down.
    pub disposed: u64,
    /// Successful `acquire` calls, reentrant ones included.
    pub acquired: u64,
    /// Releases, reentrant ones included.
    pub released: u64,
    /// Leases currently held.
    pub outstanding: u64,
    /// Proxies currently warm in the idle cache.
    pub idle: usize,
}

struct Holder {
    proxy: Arc<dyn NativeConnector>,
    references: usize,
    generation: u64,
}

struct PoolState {
    settings: LocationSettings,
    generation: u64,
    idle: Vec<Arc<dyn NativeConnector>>,
    holders: HashMap<ThreadId, Holder>,
    stats: PoolStats,
}

/// One repository endpoint and its proxy pool.
pub struct RepositoryLocation {
    id: String,
    factory: Arc<dyn ConnectorFactory>,
    cache_size: usize,
    state: Mutex<PoolState>,
}

impl fmt::Debug for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryLocation")
            .field("id", &self.id)
            .field("cache_size", &self.cache_size)
            .finish()
    }
}

impl RepositoryLocation {
    /// Creates a location. No proxy is created until the first `acquire`.
    pub fn new(
        id: impl Into<String>,
        settings: LocationSettings,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            id: id.into(),
            factory,
            cache_size: DEFAULT_PROXY_CACHE_SIZE,
            state: Mutex::new(PoolState {
                settings,
                generation: 0,
                idle: Vec::new(),
                holders: HashMap::new(),
                stats: PoolStats::default(),
            }),
        })
    }

    /// Sets how many idle proxies are kept warm.
    #[must_use]
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a snapshot of the current settings.
    pub fn settings(&self) -> Result<LocationSettings> {
        Ok(self.lock().settings.clone())
    }

    /// Returns the repository root URL.
    pub fn url(&self) -> Result<String> {
        Ok(self.lock().settings.url.clone())
    }

    pub fn username(&self) -> Result<Option<String>> {
        Ok(self.lock().settings.username.clone())
    }

    /// Leases a proxy for the calling thread.
    ///
    /// The lease must be dropped on the thread that acquired it; `ProxyLease`
    /// is not `Send`, so the compiler enforces this.
    pub fn acquire(&self) -> Result<ProxyLease<'_>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let current = thread::current().id();

        if let Some(holder) = state.holders.get_mut(&current) {
            holder.references += 1;
            let proxy = holder.proxy.clone();
            state.stats.acquired += 1;
            state.stats.outstanding += 1;
            return Ok(ProxyLease::new(self, proxy));
        }

        let proxy = match state.idle.pop() {
            Some(proxy) => proxy,
            None => {
                let created = self.factory.create(&state.settings)?;
                state.stats.created += 1;
                debug!("Created native proxy for location {}", self.id);
                Arc::new(TaggedConnector::new(created)) as Arc<dyn NativeConnector>
            }
        };
        let generation = state.generation;
        state.holders.insert(
            current,
            Holder {
                proxy: proxy.clone(),
                references: 1,
                generation,
            },
        );
        state.stats.acquired += 1;
        state.stats.outstanding += 1;
        Ok(ProxyLease::new(self, proxy))
    }

    /// Runs `f` with a leased proxy, releasing it on every exit path.
    pub fn with_proxy<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn NativeConnector) -> Result<T>,
    {
        let proxy = self.acquire()?;
        f(&*proxy)
    }

    /// Replaces the settings and flushes warm proxies.
    ///
    /// Proxies currently leased keep working with the old settings and are
    /// disposed instead of cached when released. Changing settings while
    /// another composite holds a lease is a caller error this does not detect.
    pub fn reconfigure(&self, settings: LocationSettings) -> Result<()> {
        settings.validate()?;
        let mut state = self.lock();
        state.settings = settings;
        state.generation += 1;
        Self::dispose_idle(&mut state);
        debug!("Reconfigured location {}", self.id);
        Ok(())
    }

    /// Tears down every warm proxy. Leased proxies are disposed on release.
    pub fn dispose(&self) {
        let mut state = self.lock();
        state.generation += 1;
        Self::dispose_idle(&mut state);
        debug!("Disposed proxies of location {}", self.id);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            idle: state.idle.len(),
            ..state.stats
        }
    }

    fn release(&self, proxy: &Arc<dyn NativeConnector>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let current = thread::current().id();

        let Some(holder) = state.holders.get_mut(&current) else {
            error!(
                "Proxy release without a matching acquire on location {}",
                self.id
            );
            return;
        };
        if !Arc::ptr_eq(&holder.proxy, proxy) {
            error!("Released proxy does not belong to this thread's lease on {}", self.id);
        }
        holder.references -= 1;
        state.stats.released += 1;
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        if holder.references > 0 {
            return;
        }

        let Some(holder) = state.holders.remove(&current) else {
            return;
        };
        if holder.generation != state.generation || state.idle.len() >= self.cache_size {
            holder.proxy.dispose();
            state.stats.disposed += 1;
        } else {
            state.idle.push(holder.proxy);
        }
    }

    fn dispose_idle(state: &mut PoolState) {
        for proxy in state.idle.drain(..) {
            proxy.dispose();
            state.stats.disposed += 1;
        }
    }

    // Connector code is the only thing that can panic under this lock, and
    // it runs before any pool field changes, so a poisoned pool is intact.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RepositoryLocation {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for proxy in state.idle.drain(..) {
            proxy.dispose();
        }
    }
}

/// A leased native proxy. Dereferences to the connector; releases on drop.
pub struct ProxyLease<'a> {
    location: &'a RepositoryLocation,
    proxy: Arc<dyn NativeConnector>,
    // Leases are tracked per thread and must be released where acquired.
    _not_send: PhantomData<*const ()>,
}

impl<'a> ProxyLease<'a> {
    fn new(location: &'a RepositoryLocation, proxy: Arc<dyn NativeConnector>) -> Self {
        Self {
            location,
            proxy,
            _not_send: PhantomData,
        }
    }

    pub fn location(&self) -> &RepositoryLocation {
        self.location
    }

    /// Releases the lease now. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Deref for ProxyLease<'_> {
    type Target = dyn NativeConnector;

    fn deref(&self) -> &Self::Target {
        &*self.proxy
    }
}

impl fmt::Debug for ProxyLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyLease")
            .field("location", &self.location.id)
            .finish()
    }
}

impl Drop for ProxyLease<'_> {
    fn drop(&mut self) {
        self.location.release(&self.proxy);
    }
}
