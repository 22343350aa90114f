//! Chainable definition caches layered above the reference database.
//!
//! Each node couples a storage strategy with the shared chain semantics: a
//! miss consults the successor and back-fills itself on success, an insert
//! propagates down the whole chain, and reinitialisation cascades. Both
//! stores decompose definitions into MAC rows and shared subnet rows so a
//! thousand hosts on one subnet cost one copy of the subnet's parameters.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Definition, SubnetId};
use crate::MacAddr;

/// The storage strategy behind one cache node. Implementations are called
/// with the node's lock held and must not block on other nodes.
pub trait CacheStore: Send {
    /// Every definition cached for this MAC, or None on a miss
    fn get(&mut self, mac: MacAddr) -> Result<Option<Vec<Definition>>>;
    /// Record the definitions for this MAC
    fn put(&mut self, mac: MacAddr, definitions: &[Definition]) -> Result<()>;
    /// Forget everything
    fn clear(&mut self) -> Result<()>;
}

/// A node in a caching chain.
///
/// Storage failures are logged and treated as misses so a broken cache
/// degrades to slower lookups instead of failed ones.
pub struct CacheNode {
    name: String,
    store: Mutex<Box<dyn CacheStore>>,
    next: Option<Arc<CacheNode>>,
}

impl CacheNode {
    /// Couples `store` with the chain logic, in front of `next`
    pub fn new(
        name: &str,
        store: Box<dyn CacheStore>,
        next: Option<Arc<CacheNode>>,
    ) -> Arc<Self> {
        debug!(name, chained = next.is_some(), "initialising database-cache");
        Arc::new(CacheNode {
            name: name.to_string(),
            store: Mutex::new(store),
            next,
        })
    }

    /// The definitions for `mac`, consulting successors on a miss and
    /// back-filling this node with anything they return.
    ///
    /// The node's lock is never held while calling into a successor.
    pub fn lookup(&self, mac: MacAddr) -> Option<Vec<Definition>> {
        let local = {
            let mut store = self.store.lock().expect("cache store lock poisoned");
            store.get(mac)
        };
        match local {
            Ok(Some(definitions)) => {
                debug!(%mac, cache = %self.name, "cache hit");
                Some(definitions)
            }
            Ok(None) => {
                let definitions = self.next.as_ref()?.lookup(mac)?;
                self.insert_local(mac, &definitions); // Fill from the successor's answer
                Some(definitions)
            }
            Err(e) => {
                error!(%mac, cache = %self.name, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// Records `definitions` in this node and every successor
    pub fn insert(&self, mac: MacAddr, definitions: &[Definition]) {
        self.insert_local(mac, definitions);
        if let Some(next) = &self.next {
            next.insert(mac, definitions);
        }
    }

    fn insert_local(&self, mac: MacAddr, definitions: &[Definition]) {
        let mut store = self.store.lock().expect("cache store lock poisoned");
        if let Err(e) = store.put(mac, definitions) {
            error!(%mac, cache = %self.name, error = %e, "cache update failed");
        }
    }

    /// Flushes this node and every successor
    pub fn reinitialise(&self) {
        debug!(cache = %self.name, "reinitialising database-cache");
        {
            let mut store = self.store.lock().expect("cache store lock poisoned");
            if let Err(e) = store.clear() {
                error!(cache = %self.name, error = %e, "cache reinitialisation failed");
            }
        }
        if let Some(next) = &self.next {
            next.reinitialise();
        }
    }
}

/// The per-MAC half of a decomposed definition
#[derive(Clone, Debug, Serialize, Deserialize)]
struct MapRecord {
    ip: std::net::Ipv4Addr,
    hostname: Option<String>,
    extra: Option<serde_json::Value>,
    subnet: String,
    serial: u32,
}

/// The shared per-subnet half of a decomposed definition
#[derive(Clone, Debug)]
struct SubnetRecord {
    gateways: Vec<std::net::Ipv4Addr>,
    subnet_mask: Option<std::net::Ipv4Addr>,
    broadcast_address: Option<std::net::Ipv4Addr>,
    domain_name: Option<String>,
    domain_name_servers: Vec<std::net::Ipv4Addr>,
    ntp_servers: Vec<std::net::Ipv4Addr>,
    lease_time: u32,
}

fn decompose(definition: &Definition) -> (MapRecord, SubnetRecord) {
    (
        MapRecord {
            ip: definition.ip,
            hostname: definition.hostname.clone(),
            extra: definition.extra.clone(),
            subnet: definition.subnet.clone(),
            serial: definition.serial,
        },
        SubnetRecord {
            gateways: definition.gateways.clone(),
            subnet_mask: definition.subnet_mask,
            broadcast_address: definition.broadcast_address,
            domain_name: definition.domain_name.clone(),
            domain_name_servers: definition.domain_name_servers.clone(),
            ntp_servers: definition.ntp_servers.clone(),
            lease_time: definition.lease_time,
        },
    )
}

fn recompose(map: &MapRecord, subnet: &SubnetRecord) -> Definition {
    Definition {
        ip: map.ip,
        lease_time: subnet.lease_time,
        subnet: map.subnet.clone(),
        serial: map.serial,
        hostname: map.hostname.clone(),
        gateways: subnet.gateways.clone(),
        subnet_mask: subnet.subnet_mask,
        broadcast_address: subnet.broadcast_address,
        domain_name: subnet.domain_name.clone(),
        domain_name_servers: subnet.domain_name_servers.clone(),
        ntp_servers: subnet.ntp_servers.clone(),
        extra: map.extra.clone(),
    }
}

/// An optimised in-memory cache store
pub struct MemoryStore {
    macs: HashMap<u64, Vec<MapRecord>>,
    subnets: HashMap<SubnetId, SubnetRecord>,
}

impl MemoryStore {
    /// An empty store
    pub fn new() -> Self {
        MemoryStore {
            macs: HashMap::new(),
            subnets: HashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryStore {
    fn get(&mut self, mac: MacAddr) -> Result<Option<Vec<Definition>>> {
        let Some(maps) = self.macs.get(&mac.as_u64()) else {
            return Ok(None);
        };
        let mut definitions = Vec::with_capacity(maps.len());
        for map in maps {
            let subnet_id = (map.subnet.clone(), map.serial);
            if let Some(subnet) = self.subnets.get(&subnet_id) {
                definitions.push(recompose(map, subnet));
            }
        }
        if definitions.is_empty() {
            return Ok(None);
        }
        Ok(Some(definitions))
    }

    fn put(&mut self, mac: MacAddr, definitions: &[Definition]) -> Result<()> {
        let mut maps = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let (map, subnet) = decompose(definition);
            self.subnets.insert(definition.subnet_id(), subnet);
            maps.push(map);
        }
        self.macs.insert(mac.as_u64(), maps);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.macs.clear();
        self.subnets.clear();
        Ok(())
    }
}

/// Comma-joined dotted quads, the disk tables' compact address-list form
fn join_addrs(addrs: &[std::net::Ipv4Addr]) -> Option<String> {
    if addrs.is_empty() {
        return None;
    }
    Some(
        addrs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn split_addrs(text: Option<String>) -> Result<Vec<std::net::Ipv4Addr>> {
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    text.split(',')
        .map(|token| token.trim().parse().context("bad address in cache row"))
        .collect()
}

fn parse_addr(text: Option<String>) -> Result<Option<std::net::Ipv4Addr>> {
    text.map(|t| t.parse().context("bad address in cache row"))
        .transpose()
}

/// A persistent cache store over a local embedded database: one `maps`
/// table keyed by integer MAC with a JSON details column, one `subnets`
/// table keyed by (subnet, serial).
pub struct DiskStore {
    conn: Connection,
    // Holds the backing file open for stores with no configured path
    _tempfile: Option<tempfile::NamedTempFile>,
}

impl DiskStore {
    /// Opens (creating if needed) the cache database at `path`, or at a
    /// private temporary file when no persistent path was configured
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let (conn, tempfile) = match path {
            Some(path) => (Connection::open(path)?, None),
            None => {
                let tempfile = tempfile::NamedTempFile::new()
                    .context("unable to create a private cache file")?;
                (Connection::open(tempfile.path())?, Some(tempfile))
            }
        };

        // Integrity constraints stay in the schema so every writer honours them
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subnets (
                subnet TEXT,
                serial INTEGER,
                lease_time INTEGER,
                gateway TEXT,
                subnet_mask TEXT,
                broadcast_address TEXT,
                ntp_servers TEXT,
                domain_name_servers TEXT,
                domain_name TEXT,
                PRIMARY KEY(subnet, serial)
            );
            CREATE TABLE IF NOT EXISTS maps (
                mac INTEGER PRIMARY KEY,
                details TEXT
            );",
        )?;

        Ok(DiskStore {
            conn,
            _tempfile: tempfile,
        })
    }
}

impl CacheStore for DiskStore {
    fn get(&mut self, mac: MacAddr) -> Result<Option<Vec<Definition>>> {
        let details: Option<String> = self
            .conn
            .query_row(
                "SELECT details FROM maps WHERE mac = ?1 LIMIT 1",
                params![mac.as_u64() as i64],
                |row| row.get(0),
            )
            .optional()?;
        let Some(details) = details else {
            return Ok(None);
        };

        let maps: Vec<MapRecord> = serde_json::from_str(&details)?;
        let mut definitions = Vec::with_capacity(maps.len());
        for map in &maps {
            let row = self
                .conn
                .query_row(
                    "SELECT gateway, subnet_mask, broadcast_address, domain_name,
                            domain_name_servers, ntp_servers, lease_time
                     FROM subnets WHERE subnet = ?1 AND serial = ?2 LIMIT 1",
                    params![map.subnet, map.serial],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, u32>(6)?,
                        ))
                    },
                )
                .optional()?;
            if let Some((gateway, mask, broadcast, domain, dns, ntp, lease_time)) = row {
                definitions.push(recompose(
                    map,
                    &SubnetRecord {
                        gateways: split_addrs(gateway)?,
                        subnet_mask: parse_addr(mask)?,
                        broadcast_address: parse_addr(broadcast)?,
                        domain_name: domain,
                        domain_name_servers: split_addrs(dns)?,
                        ntp_servers: split_addrs(ntp)?,
                        lease_time,
                    },
                ));
            }
        }
        if definitions.is_empty() {
            return Ok(None);
        }
        Ok(Some(definitions))
    }

    fn put(&mut self, mac: MacAddr, definitions: &[Definition]) -> Result<()> {
        let tx = self.conn.transaction()?;
        let mut maps = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let (map, subnet) = decompose(definition);
            tx.execute(
                "INSERT OR IGNORE INTO subnets (
                    subnet, serial, lease_time, gateway, subnet_mask,
                    broadcast_address, ntp_servers, domain_name_servers, domain_name
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    definition.subnet,
                    definition.serial,
                    subnet.lease_time,
                    join_addrs(&subnet.gateways),
                    subnet.subnet_mask.map(|a| a.to_string()),
                    subnet.broadcast_address.map(|a| a.to_string()),
                    join_addrs(&subnet.ntp_servers),
                    join_addrs(&subnet.domain_name_servers),
                    subnet.domain_name,
                ],
            )?;
            maps.push(map);
        }
        tx.execute(
            "INSERT OR REPLACE INTO maps (mac, details) VALUES (?1, ?2)",
            params![mac.as_u64() as i64, serde_json::to_string(&maps)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM maps", [])?;
        self.conn.execute("DELETE FROM subnets", [])?;
        Ok(())
    }
}
