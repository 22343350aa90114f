//! An INI-file reference database.
//!
//! Two section shapes share one file: `[subnet|serial]` sections declare
//! the parameters common to a network segment, and `[aa:bb:cc:dd:ee:ff]`
//! sections bind a MAC to an address within one of those segments:
//!
//! ```ini
//! [192.168.0.0/24|0]
//! lease-time: 14400
//! gateway: 192.168.0.1
//! subnet-mask: 255.255.255.0
//!
//! [02:00:00:00:00:01]
//! ip: 192.168.0.197
//! subnet: 192.168.0.0/24
//! serial: 0
//! ```
//!
//! Any other key is collected as extension metadata, prefixed with its
//! section family (`subnets.` or `maps.`); an `i:`/`f:`/`b:` key prefix
//! types the value, `s:` keeps it a string, and an uppercase prefix letter
//! turns a conversion failure into a null instead of a load error.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{Database, Definition, SubnetId};
use crate::MacAddr;

/// One parsed `[mac]` section
struct MapRow {
    ip: Ipv4Addr,
    hostname: Option<String>,
    subnet_id: SubnetId,
    extra: Option<Map<String, Value>>,
}

/// One parsed `[subnet|serial]` section
struct SubnetRow {
    lease_time: u32,
    gateways: Vec<Ipv4Addr>,
    subnet_mask: Option<Ipv4Addr>,
    broadcast_address: Option<Ipv4Addr>,
    ntp_servers: Vec<Ipv4Addr>,
    domain_name_servers: Vec<Ipv4Addr>,
    domain_name: Option<String>,
    extra: Option<Map<String, Value>>,
}

#[derive(Default)]
struct Tables {
    maps: HashMap<u64, MapRow>,
    subnets: HashMap<SubnetId, SubnetRow>,
}

/// An INI-file database broker. The file is parsed once at construction
/// and again on every reinitialisation; lookups answer from memory.
pub struct IniDatabase {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl IniDatabase {
    /// Loads the file at `path`, failing on unreadable input, missing
    /// required fields, or a map that references an undeclared subnet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        info!(path = %path.display(), "preparing to read INI database");
        let tables = parse_ini(&path)?;
        Ok(IniDatabase {
            path,
            tables: Mutex::new(tables),
        })
    }
}

#[async_trait]
impl Database for IniDatabase {
    async fn lookup_mac(&self, mac: MacAddr) -> Result<Vec<Definition>> {
        let tables = self.tables.lock().expect("INI table lock poisoned");
        let Some(map) = tables.maps.get(&mac.as_u64()) else {
            return Ok(Vec::new());
        };
        let subnet = tables
            .subnets
            .get(&map.subnet_id)
            .ok_or_else(|| anyhow!("map for {} references a missing subnet", mac))?;

        // Map-level metadata wins over subnet-level on key collisions
        let mut extra = subnet.extra.clone().unwrap_or_default();
        if let Some(map_extra) = &map.extra {
            extra.extend(map_extra.clone());
        }

        Ok(vec![Definition {
            ip: map.ip,
            lease_time: subnet.lease_time,
            subnet: map.subnet_id.0.clone(),
            serial: map.subnet_id.1,
            hostname: map.hostname.clone(),
            gateways: subnet.gateways.clone(),
            subnet_mask: subnet.subnet_mask,
            broadcast_address: subnet.broadcast_address,
            domain_name: subnet.domain_name.clone(),
            domain_name_servers: subnet.domain_name_servers.clone(),
            ntp_servers: subnet.ntp_servers.clone(),
            extra: (!extra.is_empty()).then_some(Value::Object(extra)),
        }])
    }

    fn reinitialise(&self) -> Result<()> {
        let tables = parse_ini(&self.path)?;
        *self.tables.lock().expect("INI table lock poisoned") = tables;
        Ok(())
    }
}

/// Sections in file order, each a name plus its key/value pairs
fn read_sections(text: &str) -> Result<Vec<(String, Vec<(String, String)>)>> {
    let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push((name.trim().to_string(), Vec::new()));
            continue;
        }
        let (key, value) = split_key_value(line)
            .with_context(|| format!("line {}: neither a section nor a key", number + 1))?;
        let section = sections
            .last_mut()
            .with_context(|| format!("line {}: key outside any section", number + 1))?;
        // Key case is preserved: an uppercase type prefix is meaningful
        section
            .1
            .push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(sections)
}

/// Splits `key: value` or `key = value`, keeping single-letter type
/// prefixes (`i:vlan: 12`) attached to the key
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let first = line.find([':', '='])?;
    let split_at = if line.as_bytes()[first] == b':' && first == 1 {
        line[first + 1..].find([':', '=']).map(|i| first + 1 + i)?
    } else {
        first
    };
    Some((&line[..split_at], &line[split_at + 1..]))
}

fn parse_ini(path: &std::path::Path) -> Result<Tables> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read '{}'", path.display()))?;

    let mut tables = Tables::default();
    for (name, pairs) in read_sections(&text)? {
        if let Some((subnet, serial)) = split_subnet_section(&name) {
            debug!(section = %name, "processing subnet");
            let row = parse_subnet(&name, &pairs)?;
            tables.subnets.insert((subnet, serial), row);
        } else if let Ok(mac) = name.parse::<MacAddr>() {
            debug!(section = %name, "processing map");
            let row = parse_map(&name, &pairs)?;
            tables.maps.insert(mac.as_u64(), row);
        } else {
            warn!(section = %name, "unrecognised section encountered");
        }
    }

    // Foreign-key checking up front, to avoid deferred errors
    for row in tables.maps.values() {
        if !tables.subnets.contains_key(&row.subnet_id) {
            bail!(
                "map references unknown subnet '{}|{}'",
                row.subnet_id.0,
                row.subnet_id.1
            );
        }
    }

    Ok(tables)
}

/// `"net|serial"` split into its halves, or None for map sections
fn split_subnet_section(name: &str) -> Option<(String, u32)> {
    let (subnet, serial) = name.rsplit_once('|')?;
    Some((subnet.to_string(), serial.parse().ok()?))
}

fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

fn parse_addr_list(text: Option<&str>, limit: Option<usize>) -> Result<Vec<Ipv4Addr>> {
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    let mut addrs = Vec::new();
    for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        addrs.push(token.parse().with_context(|| format!("bad address '{}'", token))?);
    }
    if let Some(limit) = limit {
        addrs.truncate(limit);
    }
    Ok(addrs)
}

fn parse_addr(text: Option<&str>) -> Result<Option<Ipv4Addr>> {
    text.map(|t| t.parse().with_context(|| format!("bad address '{}'", t)))
        .transpose()
}

fn parse_subnet(section: &str, pairs: &[(String, String)]) -> Result<SubnetRow> {
    let lease_time = get(pairs, "lease-time")
        .with_context(|| format!("field 'lease-time' unspecified for '{}'", section))?
        .parse()
        .with_context(|| format!("bad lease-time in '{}'", section))?;

    Ok(SubnetRow {
        lease_time,
        gateways: parse_addr_list(get(pairs, "gateway"), None)?,
        subnet_mask: parse_addr(get(pairs, "subnet-mask"))?,
        broadcast_address: parse_addr(get(pairs, "broadcast-address"))?,
        ntp_servers: parse_addr_list(get(pairs, "ntp-servers"), Some(3))?,
        domain_name_servers: parse_addr_list(get(pairs, "domain-name-servers"), Some(3))?,
        domain_name: get(pairs, "domain-name").map(str::to_string),
        extra: parse_extra(
            pairs,
            &[
                "lease-time",
                "gateway",
                "subnet-mask",
                "broadcast-address",
                "ntp-servers",
                "domain-name-servers",
                "domain-name",
            ],
            "subnets",
        )?,
    })
}

fn parse_map(section: &str, pairs: &[(String, String)]) -> Result<MapRow> {
    let ip = get(pairs, "ip")
        .with_context(|| format!("field 'ip' unspecified for '{}'", section))?
        .parse()
        .with_context(|| format!("bad ip in '{}'", section))?;
    let subnet = get(pairs, "subnet")
        .with_context(|| format!("field 'subnet' unspecified for '{}'", section))?;
    let serial = get(pairs, "serial")
        .with_context(|| format!("field 'serial' unspecified for '{}'", section))?
        .parse()
        .with_context(|| format!("bad serial in '{}'", section))?;

    Ok(MapRow {
        ip,
        hostname: get(pairs, "hostname").map(str::to_string),
        subnet_id: (subnet.to_string(), serial),
        extra: parse_extra(pairs, &["ip", "hostname", "subnet", "serial"], "maps")?,
    })
}

/// Collects non-reserved keys as `<family>.<key>` metadata, honouring the
/// type prefixes described in the module docs
fn parse_extra(
    pairs: &[(String, String)],
    omitted: &[&str],
    family: &str,
) -> Result<Option<Map<String, Value>>> {
    let mut extra = Map::new();
    for (key, value) in pairs {
        if omitted.iter().any(|o| key.eq_ignore_ascii_case(o)) {
            continue;
        }
        let (key, converted) = parse_extra_option(key, value)?;
        extra.insert(format!("{}.{}", family, key), converted);
    }
    Ok((!extra.is_empty()).then_some(extra))
}

fn parse_extra_option(key: &str, value: &str) -> Result<(String, Value)> {
    let Some((prefix, real_key)) = key.split_once(':') else {
        return Ok((key.to_string(), Value::String(value.to_string())));
    };
    let none_on_error = prefix.chars().all(|c| c.is_ascii_uppercase());
    let converted = match prefix.to_ascii_lowercase().as_str() {
        "s" => Some(Value::String(value.to_string())),
        "i" => value.parse::<i64>().ok().map(Value::from),
        "f" => value.parse::<f64>().ok().map(Value::from),
        "b" => Some(Value::Bool(matches!(
            value.to_lowercase().trim(),
            "y" | "yes" | "t" | "true" | "ok" | "okay" | "1"
        ))),
        _ => return Ok((key.to_string(), Value::String(value.to_string()))),
    };
    match converted {
        Some(converted) => Ok((real_key.to_string(), converted)),
        None if none_on_error => Ok((real_key.to_string(), Value::Null)),
        None => bail!("unable to convert '{}' for key '{}'", value, key),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
; office network
[192.168.0.0/24|0]
lease-time: 14400
gateway: 192.168.0.1
subnet-mask: 255.255.255.0
broadcast-address: 192.168.0.255
domain-name-servers: 192.168.0.2, 192.168.0.3
domain-name: example.org
i:vlan: 12

[02:00:00:00:00:01]
ip: 192.168.0.197
hostname: printer
subnet: 192.168.0.0/24
serial: 0
B:managed: yes
";

    fn write_sample(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_lookup_composes_definition() {
        let file = write_sample(SAMPLE);
        let db = IniDatabase::open(file.path()).unwrap();

        let found = db
            .lookup_mac("02:00:00:00:00:01".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let definition = &found[0];
        assert_eq!(definition.ip, Ipv4Addr::new(192, 168, 0, 197));
        assert_eq!(definition.lease_time, 14400);
        assert_eq!(definition.subnet, "192.168.0.0/24");
        assert_eq!(definition.serial, 0);
        assert_eq!(definition.hostname.as_deref(), Some("printer"));
        assert_eq!(definition.gateways, vec![Ipv4Addr::new(192, 168, 0, 1)]);
        assert_eq!(
            definition.domain_name_servers,
            vec![Ipv4Addr::new(192, 168, 0, 2), Ipv4Addr::new(192, 168, 0, 3)]
        );
        let extra = definition.extra.as_ref().unwrap();
        assert_eq!(extra["subnets.vlan"], 12);
        assert_eq!(extra["maps.managed"], true);

        let missing = db
            .lookup_mac("02:00:00:00:00:99".parse().unwrap())
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_reinitialise_rereads_file() {
        let file = write_sample(SAMPLE);
        let db = IniDatabase::open(file.path()).unwrap();

        let updated = SAMPLE.replace("192.168.0.197", "192.168.0.200");
        std::fs::write(file.path(), updated).unwrap();
        db.reinitialise().unwrap();

        let found = db
            .lookup_mac("02:00:00:00:00:01".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(found[0].ip, Ipv4Addr::new(192, 168, 0, 200));
    }

    #[test]
    fn test_missing_required_field_fails() {
        let file = write_sample("[10.0.0.0/8|1]\ngateway: 10.0.0.1\n");
        assert!(IniDatabase::open(file.path()).is_err());
    }

    #[test]
    fn test_dangling_subnet_reference_fails() {
        let file = write_sample(
            "[02:00:00:00:00:01]\nip: 10.0.0.5\nsubnet: nowhere\nserial: 3\n",
        );
        assert!(IniDatabase::open(file.path()).is_err());
    }

    #[test]
    fn test_split_key_value_keeps_type_prefixes() {
        assert_eq!(split_key_value("ip: 10.0.0.5"), Some(("ip", " 10.0.0.5")));
        assert_eq!(split_key_value("i:vlan: 12"), Some(("i:vlan", " 12")));
        assert_eq!(split_key_value("b:managed = yes"), Some(("b:managed", " yes")));
        assert_eq!(split_key_value("no delimiter"), None);
    }

    #[test]
    fn test_uppercase_prefix_nulls_bad_values() {
        let (key, value) = parse_extra_option("I:count", "not-a-number").unwrap();
        assert_eq!(key, "count");
        assert_eq!(value, Value::Null);
        assert!(parse_extra_option("i:count", "not-a-number").is_err());
    }
}
