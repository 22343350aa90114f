//! Server configuration and the operator extension hooks.
//!
//! Configuration is an explicit struct handed to the engine and link at
//! construction; there is no global mutable state. Field names follow the
//! recognised option names of the configuration contract, lowercased.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

use crate::db::Definition;
use crate::dhcp::packet::{DhcpPacket, PxeOptions};
use crate::MacAddr;

/// An 802.1Q tag to insert into raw responses, in order of appearance
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct QTag {
    /// Priority code point, 0-7
    pub pcp: u8,
    /// Drop eligible indicator
    pub dei: bool,
    /// VLAN identifier, 1-4094
    pub vid: u16,
}

impl QTag {
    /// Rejects values outside the 802.1Q field ranges
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.pcp <= 7, "qtag pcp {} out of range 0-7", self.pcp);
        anyhow::ensure!(
            (1..=4094).contains(&self.vid),
            "qtag vid {} out of range 1-4094",
            self.vid
        );
        Ok(())
    }
}

/// Everything the server core needs to know, with the contract defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The IP on which to offer DHCP service; also the server-identifier
    pub server_ip: Ipv4Addr,
    /// The port on which servers and relays listen
    pub server_port: u16,
    /// The port on which clients listen
    pub client_port: u16,
    /// A secondary proxy/PXE listening port, typically 4011
    pub proxy_port: Option<u16>,
    /// The interface on which to provide raw Ethernet responses
    pub response_interface: Option<String>,
    /// Any qtags to insert into raw responses
    pub response_interface_qtags: Vec<QTag>,

    /// Whether link-local requests are served
    pub allow_local_dhcp: bool,
    /// Whether relayed requests are served
    pub allow_dhcp_relays: bool,
    /// If non-empty, the only relays served
    pub allowed_dhcp_relays: Vec<Ipv4Addr>,

    /// Whether unknown MACs are NAKed rather than ignored
    pub authoritative: bool,
    /// Whether RENEW/REBIND requests are NAKed to force re-discovery
    pub nak_renewals: bool,
    /// Whether a DISCOVER carrying option 80 is answered with an ACK
    pub enable_rapidcommit: bool,

    /// Whether over-active MACs are temporarily ignored
    pub enable_suspend: bool,
    /// Actions per decay window a MAC may take before suspension
    pub suspend_threshold: u32,
    /// Seconds a MAC is ignored after a policy violation
    pub unauthorized_client_timeout: u32,
    /// Seconds a MAC is ignored after tripping the suspend threshold
    pub misbehaving_client_timeout: u32,

    /// Whether definitions are cached at all
    pub use_cache: bool,
    /// Whether the cache lives on disk instead of in memory
    pub cache_on_disk: bool,
    /// A path for a cache that survives restarts
    pub persistent_cache: Option<PathBuf>,
    /// Simultaneous real database calls permitted
    pub database_concurrency_limit: usize,
    /// Path of the INI reference database, for the bundled backend
    pub ini_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_ip: Ipv4Addr::UNSPECIFIED,
            server_port: 67,
            client_port: 68,
            proxy_port: None,
            response_interface: None,
            response_interface_qtags: Vec::new(),
            allow_local_dhcp: true,
            allow_dhcp_relays: false,
            allowed_dhcp_relays: Vec::new(),
            authoritative: false,
            nak_renewals: false,
            enable_rapidcommit: true,
            enable_suspend: true,
            suspend_threshold: 10,
            unauthorized_client_timeout: 60,
            misbehaving_client_timeout: 150,
            use_cache: false,
            cache_on_disk: false,
            persistent_cache: None,
            database_concurrency_limit: 4,
            ini_file: None,
        }
    }
}

impl Config {
    /// Startup validation: a server address must be set and qtags must be
    /// within their field ranges
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.server_ip.is_unspecified(),
            "server_ip must be configured"
        );
        for qtag in &self.response_interface_qtags {
            qtag.validate()?;
        }
        Ok(())
    }
}

/// Operator extension points, called by the engine at fixed places in the
/// packet path. Every method has a neutral default, so an implementation
/// only overrides what it needs; errors are caught by the engine, logged,
/// and treated as "leave this packet unprocessed".
#[allow(unused_variables)]
pub trait Hooks: Send + Sync {
    /// Called once before the server starts handling traffic
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called before the database lookup; returning false drops the packet
    /// and blacklists its sender
    fn filter_packet(
        &self,
        packet: &DhcpPacket,
        packet_type: &str,
        mac: MacAddr,
        client_ip: Option<Ipv4Addr>,
        relay_ip: Option<Ipv4Addr>,
        pxe: Option<&PxeOptions>,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Called when the database has no match; may fabricate a definition
    fn handle_unknown_mac(
        &self,
        packet: &DhcpPacket,
        packet_type: &str,
        mac: MacAddr,
        client_ip: Option<Ipv4Addr>,
        relay_ip: Option<Ipv4Addr>,
        pxe: Option<&PxeOptions>,
    ) -> Result<Option<Definition>> {
        Ok(None)
    }

    /// Called when the database returns more than one candidate; must pick
    /// one or None to drop the packet
    fn filter_retrieved_definitions(
        &self,
        definitions: Vec<Definition>,
        packet: &DhcpPacket,
        packet_type: &str,
        mac: MacAddr,
        client_ip: Option<Ipv4Addr>,
        relay_ip: Option<Ipv4Addr>,
        pxe: Option<&PxeOptions>,
    ) -> Result<Option<Definition>> {
        Ok(None)
    }

    /// Called after the reply's options are filled, immediately before
    /// transmission; may mutate anything, including the response-address
    /// override fields. Returning false drops the packet.
    fn load_dhcp_packet(
        &self,
        packet: &mut DhcpPacket,
        packet_type: &str,
        mac: MacAddr,
        definition: &Definition,
        relay_ip: Option<Ipv4Addr>,
        pxe: Option<&PxeOptions>,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// The neutral hook set: accept everything, fabricate nothing
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

/// Shared, dynamically-dispatched hooks as the engine stores them
pub type SharedHooks = Arc<dyn Hooks>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.server_port, 67);
        assert_eq!(config.client_port, 68);
        assert_eq!(config.proxy_port, None);
        assert!(config.allow_local_dhcp);
        assert!(!config.allow_dhcp_relays);
        assert!(!config.authoritative);
        assert!(!config.nak_renewals);
        assert!(config.enable_rapidcommit);
        assert!(config.enable_suspend);
        assert_eq!(config.suspend_threshold, 10);
        assert_eq!(config.unauthorized_client_timeout, 60);
        assert_eq!(config.misbehaving_client_timeout, 150);
        assert!(!config.use_cache);
        assert!(!config.cache_on_disk);
        assert_eq!(config.database_concurrency_limit, 4);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_err()); // No server IP

        config.server_ip = Ipv4Addr::new(10, 0, 0, 1);
        assert!(config.validate().is_ok());

        config.response_interface_qtags = vec![QTag {
            pcp: 8,
            dei: false,
            vid: 100,
        }];
        assert!(config.validate().is_err());

        config.response_interface_qtags = vec![QTag {
            pcp: 3,
            dei: true,
            vid: 4095,
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_parses_from_json() {
        let config: Config = serde_json::from_str(
            r#"{
                "server_ip": "10.0.0.1",
                "proxy_port": 4011,
                "allowed_dhcp_relays": ["10.0.0.254"],
                "response_interface_qtags": [{"pcp": 1, "dei": false, "vid": 12}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.server_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(config.proxy_port, Some(4011));
        assert_eq!(config.allowed_dhcp_relays, vec![Ipv4Addr::new(10, 0, 0, 254)]);
        assert_eq!(config.response_interface_qtags[0].vid, 12);
        // Unspecified fields keep their defaults
        assert_eq!(config.server_port, 67);
    }
}
