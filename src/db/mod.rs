//! The reference-database interface: resolving a MAC address to the
//! administrator-authored definition of its "lease", with layered caching
//! and a concurrency throttle in front of the real data source.

use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::MacAddr;

pub mod cache;
pub mod ini;

/// Identity of a "subnet" row in the reference database
pub type SubnetId = (String, u32);

/// A definition of a "lease" from a database: the full configuration a
/// client is entitled to, bound to its MAC.
///
/// `subnet` and `serial` together identify the subnet row the definition
/// was drawn from; the caches use that pair to share per-subnet state
/// between hosts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// The IPv4 address to assign
    pub ip: Ipv4Addr,
    /// The number of seconds for which the assignment is valid
    pub lease_time: u32,
    /// The "subnet" identifier of the record in the database
    pub subnet: String,
    /// The "serial" identifier of the record in the database
    pub serial: u32,
    /// The hostname to assign
    #[serde(default)]
    pub hostname: Option<String>,
    /// The gateways to advertise
    #[serde(default)]
    pub gateways: Vec<Ipv4Addr>,
    /// The netmask to advertise
    #[serde(default)]
    pub subnet_mask: Option<Ipv4Addr>,
    /// The broadcast address to advertise
    #[serde(default)]
    pub broadcast_address: Option<Ipv4Addr>,
    /// The domain name to advertise
    #[serde(default)]
    pub domain_name: Option<String>,
    /// DNS addresses to advertise, at most three
    #[serde(default)]
    pub domain_name_servers: Vec<Ipv4Addr>,
    /// NTP addresses to advertise, at most three
    #[serde(default)]
    pub ntp_servers: Vec<Ipv4Addr>,
    /// Opaque metadata from the database, for extensions
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl Definition {
    /// A minimal definition with only the required fields populated
    pub fn new(ip: Ipv4Addr, lease_time: u32, subnet: &str, serial: u32) -> Self {
        Definition {
            ip,
            lease_time,
            subnet: subnet.to_string(),
            serial,
            hostname: None,
            gateways: Vec::new(),
            subnet_mask: None,
            broadcast_address: None,
            domain_name: None,
            domain_name_servers: Vec::new(),
            ntp_servers: Vec::new(),
            extra: None,
        }
    }

    /// The identity of the subnet row this definition belongs to
    pub fn subnet_id(&self) -> SubnetId {
        (self.subnet.clone(), self.serial)
    }
}

/// The features a reference database must provide. Implementations must be
/// safe to call concurrently.
#[async_trait]
pub trait Database: Send + Sync {
    /// Queries the database for the given MAC address, returning every
    /// matching definition; an empty vector means the MAC is unknown.
    async fn lookup_mac(&self, mac: MacAddr) -> Result<Vec<Definition>>;

    /// Guarantees the database will serve fresh data, whether that means
    /// flushing a cache or re-reading the source.
    fn reinitialise(&self) -> Result<()>;
}

/// A database that never serves anything; useful for testing or for
/// deployments that resolve every client through `handle_unknown_mac`.
pub struct NullDatabase;

#[async_trait]
impl Database for NullDatabase {
    async fn lookup_mac(&self, _mac: MacAddr) -> Result<Vec<Definition>> {
        Ok(Vec::new())
    }

    fn reinitialise(&self) -> Result<()> {
        Ok(())
    }
}

/// Caching and concurrency-throttling in front of a real database.
///
/// Lookups try the cache chain first and bypass the throttle entirely on a
/// hit; misses take a semaphore permit, query the backend, release the
/// permit, and only then write the result back through the chain.
pub struct CachingDatabase<D: Database> {
    backend: D,
    cache: Option<Arc<cache::CacheNode>>,
    throttle: Semaphore,
}

impl<D: Database> CachingDatabase<D> {
    /// Wraps `backend`, permitting at most `concurrency_limit` simultaneous
    /// backend calls
    pub fn new(
        backend: D,
        cache: Option<Arc<cache::CacheNode>>,
        concurrency_limit: usize,
    ) -> Self {
        debug!(
            concurrency_limit,
            "initialising database with bounded concurrent connections"
        );
        CachingDatabase {
            backend,
            cache,
            throttle: Semaphore::new(concurrency_limit.min(Semaphore::MAX_PERMITS)),
        }
    }
}

#[async_trait]
impl<D: Database> Database for CachingDatabase<D> {
    async fn lookup_mac(&self, mac: MacAddr) -> Result<Vec<Definition>> {
        if let Some(cache) = &self.cache {
            if let Some(definitions) = cache.lookup(mac) {
                return Ok(definitions);
            }
        }

        let definitions = {
            let _permit = self.throttle.acquire().await?;
            self.backend.lookup_mac(mac).await?
        }; // Permit released before the cache write

        if !definitions.is_empty() {
            if let Some(cache) = &self.cache {
                cache.insert(mac, &definitions);
            }
        }
        Ok(definitions)
    }

    fn reinitialise(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.reinitialise();
        }
        self.backend.reinitialise()
    }
}

/// Builds the cache chain the configuration asks for: nothing, memory-only,
/// disk-only, or memory backed by disk. Disk failures degrade with a
/// warning rather than aborting startup.
pub fn build_cache(config: &Config) -> Option<Arc<cache::CacheNode>> {
    if !config.use_cache {
        if config.persistent_cache.is_some() {
            warn!("persistent_cache was set, but use_cache was not");
        }
        if config.cache_on_disk {
            warn!("cache_on_disk was set, but use_cache was not");
        }
        return None;
    }

    if config.persistent_cache.is_some() || config.cache_on_disk {
        let name = if config.persistent_cache.is_some() {
            "persistent"
        } else {
            "disk"
        };
        match cache::DiskStore::open(config.persistent_cache.as_deref()) {
            Ok(store) => {
                let disk = cache::CacheNode::new(name, Box::new(store), None);
                if config.cache_on_disk {
                    debug!("combining local caching database and persistent caching database");
                    return Some(disk);
                }
                debug!("setting up memory-cache on top of persistent caching database");
                return Some(cache::CacheNode::new("memory", Box::new(cache::MemoryStore::new()), Some(disk)));
            }
            Err(e) => {
                error!(error = %e, "unable to initialise disk-based caching");
                if config.persistent_cache.is_some() && !config.cache_on_disk {
                    warn!("persistent caching is not available");
                    return Some(cache::CacheNode::new(
                        "memory-nonpersist",
                        Box::new(cache::MemoryStore::new()),
                        None,
                    ));
                }
                warn!("caching is disabled: memory-caching was not requested, so no fallback exists");
                return None;
            }
        }
    }

    debug!("setting up memory-cache");
    Some(cache::CacheNode::new(
        "memory",
        Box::new(cache::MemoryStore::new()),
        None,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A backend that counts how many times it is actually consulted
    struct CountingDatabase {
        hits: AtomicUsize,
        definition: Definition,
    }

    #[async_trait]
    impl Database for CountingDatabase {
        async fn lookup_mac(&self, mac: MacAddr) -> Result<Vec<Definition>> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if mac == MacAddr::new([2, 0, 0, 0, 0, 1]) {
                Ok(vec![self.definition.clone()])
            } else {
                Ok(Vec::new())
            }
        }

        fn reinitialise(&self) -> Result<()> {
            Ok(())
        }
    }

    fn counting_database() -> CountingDatabase {
        CountingDatabase {
            hits: AtomicUsize::new(0),
            definition: Definition::new(Ipv4Addr::new(10, 0, 0, 5), 3600, "s", 0),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_bypasses_backend() {
        let cache = cache::CacheNode::new("memory", Box::new(cache::MemoryStore::new()), None);
        let db = CachingDatabase::new(counting_database(), Some(cache), 4);
        let mac = MacAddr::new([2, 0, 0, 0, 0, 1]);

        let first = db.lookup_mac(mac).await.unwrap();
        let second = db.lookup_mac(mac).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(db.backend.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let cache = cache::CacheNode::new("memory", Box::new(cache::MemoryStore::new()), None);
        let db = CachingDatabase::new(counting_database(), Some(cache), 4);
        let mac = MacAddr::new([2, 0, 0, 0, 0, 0x99]);

        assert!(db.lookup_mac(mac).await.unwrap().is_empty());
        assert!(db.lookup_mac(mac).await.unwrap().is_empty());
        // Unknown MACs go to the backend every time
        assert_eq!(db.backend.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reinitialise_flushes_cache() {
        let cache = cache::CacheNode::new("memory", Box::new(cache::MemoryStore::new()), None);
        let db = CachingDatabase::new(counting_database(), Some(cache), 4);
        let mac = MacAddr::new([2, 0, 0, 0, 0, 1]);

        db.lookup_mac(mac).await.unwrap();
        db.reinitialise().unwrap();
        db.lookup_mac(mac).await.unwrap();
        assert_eq!(db.backend.hits.load(Ordering::SeqCst), 2);
    }
}
