//! The authoritative DHCP option table: per-code name and wire format, plus
//! the length rules and byte-level conversion helpers the codec uses.
//!
//! Everything per-option is generated from the single `dhcp_options!` table
//! below so the enum, the name lookup, and the format lookup cannot drift
//! apart. Codes absent from the table are unknown: the decoder skips them
//! and the setter refuses them.

use std::net::Ipv4Addr;

/// Options that must always be delivered, whether or not the client's
/// parameter-request-list (option 55) names them.
pub const MANDATORY_OPTIONS: [u8; 9] = [1, 3, 6, 15, 51, 53, 54, 58, 59];

/// The wire format family of an option's value.
///
/// The scalar families carry their length rules; the composite families are
/// built and parsed by the helpers in [`crate::dhcp::rfc`] and validated
/// only loosely on length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionFormat {
    /// A single IPv4 address
    Ipv4,
    /// One or more IPv4 addresses
    Ipv4List,
    /// A single byte
    Byte,
    /// One or more bytes
    ByteList,
    /// Free-form text or opaque bytes, possibly empty
    String,
    /// A single boolean byte
    Bool,
    /// A 16-bit unsigned integer
    U16,
    /// One or more 16-bit unsigned integers
    U16List,
    /// A 32-bit unsigned integer
    U32,
    /// One or more 32-bit unsigned integers
    U32List,
    /// A type byte followed by at least one byte of identifier
    Identifier,
    /// A zero-length flag option
    None,
    /// RFC-1035 name list (options 119, 88, 137)
    NameList,
    /// RFC-2610 SLP directory agent (option 78)
    SlpDirectoryAgent,
    /// RFC-2610 SLP service scope (option 79)
    SlpServiceScope,
    /// RFC-3046 relay agent sub-options (option 82)
    RelayAgent,
    /// RFC-3361 SIP servers: IPv4 list or name list, never mixed (option 120)
    SipServers,
    /// RFC-3442 classless static routes (option 121)
    ClasslessRoutes,
    /// RFC-3925 vendor-identifying class (option 124)
    VendorClasses,
    /// RFC-3925 vendor-identifying specific information (option 125)
    VendorSpecific,
    /// RFC-4174 iSNS configuration (option 83)
    Isns,
    /// RFC-5678 MoS IPv4 sub-option list (option 139)
    MosAddresses,
    /// RFC-5678 MoS FQDN sub-option list (option 140)
    MosDomains,
}

/// Length rule for an option value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthRule {
    /// Exactly this many bytes
    Fixed(usize),
    /// At least `minimum` bytes, in multiples of `multiple`
    Variable {
        /// Smallest acceptable length
        minimum: usize,
        /// Length must be a whole number of these
        multiple: usize,
    },
}

impl LengthRule {
    /// Whether a value of `len` bytes satisfies the rule
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            LengthRule::Fixed(n) => len == n,
            LengthRule::Variable { minimum, multiple } => {
                len >= minimum && len % multiple == 0
            }
        }
    }
}

impl OptionFormat {
    /// The length rule this format imposes on values
    pub fn length_rule(&self) -> LengthRule {
        use OptionFormat::*;
        match self {
            Ipv4 => LengthRule::Fixed(4),
            Ipv4List => LengthRule::Variable {
                minimum: 4,
                multiple: 4,
            },
            Byte => LengthRule::Fixed(1),
            ByteList => LengthRule::Variable {
                minimum: 1,
                multiple: 1,
            },
            String => LengthRule::Variable {
                minimum: 0,
                multiple: 1,
            },
            Bool => LengthRule::Fixed(1),
            U16 => LengthRule::Fixed(2),
            U16List => LengthRule::Variable {
                minimum: 2,
                multiple: 2,
            },
            U32 => LengthRule::Fixed(4),
            U32List => LengthRule::Variable {
                minimum: 4,
                multiple: 4,
            },
            Identifier => LengthRule::Variable {
                minimum: 2,
                multiple: 1,
            },
            None => LengthRule::Fixed(0),
            // Composite values are produced by their builders; only require presence
            _ => LengthRule::Variable {
                minimum: 1,
                multiple: 1,
            },
        }
    }
}

macro_rules! dhcp_options {
    (
        $(
            $code:literal => $variant:ident, $name:literal, $format:ident;
        )+
    ) => {
        crate::enum_with_unknown! {
            /// Option type codes, named per common usage.
            /// Codes not listed here are carried opaquely when received and
            /// cannot be set through the validating interface.
            pub enum DhcpOptionKind(u8) {
                $(
                    #[doc = $name]
                    $variant = $code
                ),+
            }
        }

        /// The canonical lower-snake name of an option code, if known
        pub fn option_name(code: u8) -> Option<&'static str> {
            match code {
                $( $code => Some($name), )+
                _ => None,
            }
        }

        /// The wire format family of an option code, if known
        pub fn option_format(code: u8) -> Option<OptionFormat> {
            match code {
                $( $code => Some(OptionFormat::$format), )+
                _ => None,
            }
        }
    };
}

dhcp_options! {
      1 => SubnetMask, "subnet_mask", Ipv4;
      2 => TimeOffset, "time_offset", U32;
      3 => Router, "router", Ipv4List;
      4 => TimeServer, "time_server", Ipv4List;
      5 => NameServer, "name_server", Ipv4List;
      6 => DomainNameServers, "domain_name_servers", Ipv4List;
      7 => LogServer, "log_server", Ipv4List;
      8 => CookieServer, "cookie_server", Ipv4List;
      9 => LprServer, "lpr_server", Ipv4List;
     10 => ImpressServer, "impress_server", Ipv4List;
     11 => ResourceLocationServer, "resource_location_server", Ipv4List;
     12 => Hostname, "hostname", String;
     13 => BootFileSize, "boot_file_size", U16;
     14 => MeritDumpFile, "merit_dump_file", String;
     15 => DomainName, "domain_name", String;
     16 => SwapServer, "swap_server", Ipv4;
     17 => RootPath, "root_path", String;
     18 => ExtensionsPath, "extensions_path", String;
     19 => IpForwarding, "ip_forwarding", Bool;
     20 => NonLocalSourceRouting, "non_local_source_routing", Bool;
     21 => PolicyFilter, "policy_filter", Ipv4List;
     22 => MaximumDatagramReassemblySize, "maximum_datagram_reassembly_size", U16;
     23 => DefaultIpTtl, "default_ip_ttl", Byte;
     24 => PathMtuAgingTimeout, "path_mtu_aging_timeout", U32;
     25 => PathMtuPlateauTable, "path_mtu_plateau_table", U16List;
     26 => InterfaceMtu, "interface_mtu", U16;
     27 => AllSubnetsLocal, "all_subnets_local", Bool;
     28 => BroadcastAddress, "broadcast_address", Ipv4;
     29 => PerformMaskDiscovery, "perform_mask_discovery", Bool;
     30 => MaskSupplier, "mask_supplier", Bool;
     31 => PerformRouterDiscovery, "perform_router_discovery", Bool;
     32 => RouterSolicitationAddress, "router_solicitation_address", Ipv4;
     33 => StaticRoutes, "static_routes", Ipv4List;
     34 => TrailerEncapsulation, "trailer_encapsulation", Bool;
     35 => ArpCacheTimeout, "arp_cache_timeout", U32;
     36 => EthernetEncapsulation, "ethernet_encapsulation", Bool;
     37 => TcpDefaultTtl, "tcp_default_ttl", Byte;
     38 => TcpKeepaliveInterval, "tcp_keepalive_interval", U32;
     39 => TcpKeepaliveGarbage, "tcp_keepalive_garbage", Bool;
     40 => NisDomain, "nis_domain", String;
     41 => NisServers, "nis_servers", Ipv4List;
     42 => NtpServers, "ntp_servers", Ipv4List;
     43 => VendorSpecificInformation, "vendor_specific_information", String;
     44 => NetbiosNameServers, "netbios_name_servers", Ipv4List;
     45 => NetbiosDdServers, "netbios_dd_servers", Ipv4List;
     46 => NetbiosNodeType, "netbios_node_type", Byte;
     47 => NetbiosScope, "netbios_scope", String;
     48 => XWindowFontServers, "x_window_font_servers", Ipv4List;
     49 => XWindowDisplayManagers, "x_window_display_managers", Ipv4List;
     50 => RequestedIpAddress, "requested_ip_address", Ipv4;
     51 => IpAddressLeaseTime, "ip_address_lease_time", U32;
     52 => OptionOverload, "option_overload", Byte;
     53 => DhcpMessageType, "dhcp_message_type", Byte;
     54 => ServerIdentifier, "server_identifier", Ipv4;
     55 => ParameterRequestList, "parameter_request_list", ByteList;
     56 => Message, "message", String;
     57 => MaximumMessageSize, "maximum_message_size", U16;
     58 => RenewalTimeValue, "renewal_time_value", U32;
     59 => RebindingTimeValue, "rebinding_time_value", U32;
     60 => VendorClassIdentifier, "vendor_class_identifier", String;
     61 => ClientIdentifier, "client_identifier", Identifier;
     62 => NetwareIpDomain, "netware_ip_domain", String;
     63 => NetwareIpOptions, "netware_ip_options", ByteList;
     64 => NisPlusDomain, "nis_plus_domain", String;
     65 => NisPlusServers, "nis_plus_servers", Ipv4List;
     66 => TftpServerName, "tftp_server_name", String;
     67 => BootfileName, "bootfile_name", String;
     68 => MobileIpHomeAgents, "mobile_ip_home_agents", Ipv4List;
     69 => SmtpServers, "smtp_servers", Ipv4List;
     70 => Pop3Servers, "pop3_servers", Ipv4List;
     71 => NntpServers, "nntp_servers", Ipv4List;
     72 => WwwServers, "www_servers", Ipv4List;
     73 => FingerServers, "finger_servers", Ipv4List;
     74 => IrcServers, "irc_servers", Ipv4List;
     75 => StreettalkServers, "streettalk_servers", Ipv4List;
     76 => StreettalkDirectoryAssistanceServers, "streettalk_directory_assistance_servers", Ipv4List;
     77 => UserClass, "user_class", ByteList;
     78 => DirectoryAgent, "directory_agent", SlpDirectoryAgent;
     79 => ServiceScope, "service_scope", SlpServiceScope;
     80 => RapidCommit, "rapid_commit", None;
     81 => ClientFqdn, "client_fqdn", String;
     82 => RelayAgentInformation, "relay_agent", RelayAgent;
     83 => InternetStorageNameService, "internet_storage_name_service", Isns;
     85 => NdsServers, "nds_servers", Ipv4List;
     86 => NdsTreeName, "nds_tree_name", String;
     87 => NdsContext, "nds_context", String;
     88 => BcmcsDomainList, "bcmcs_domain_list", NameList;
     89 => BcmcsAddressList, "bcmcs_address_list", Ipv4List;
     90 => Authentication, "authentication", ByteList;
     91 => ClientLastTransactionTime, "client_last_transaction_time", U32;
     92 => AssociatedIp, "associated_ip", Ipv4List;
     93 => ClientSystem, "client_system", U16List;
     94 => ClientNdi, "client_ndi", ByteList;
     97 => UuidGuid, "uuid_guid", Identifier;
     98 => UapServers, "uap_servers", String;
    100 => PosixTimezone, "posix_timezone", String;
    101 => TzdbTimezone, "tzdb_timezone", String;
    112 => NetinfoAddress, "netinfo_address", Ipv4List;
    113 => NetinfoTag, "netinfo_tag", String;
    114 => DefaultUrl, "default_url", String;
    118 => SubnetSelection, "subnet_selection", Ipv4;
    119 => DomainSearch, "domain_search", NameList;
    120 => SipServers, "sip_servers", SipServers;
    121 => ClasslessStaticRoute, "classless_static_route", ClasslessRoutes;
    124 => VendorClass, "vendor_class", VendorClasses;
    125 => VendorSpecific, "vendor_specific", VendorSpecific;
    136 => PanaAgent, "pana_agent", Ipv4List;
    137 => V4Lost, "v4_lost", NameList;
    138 => CapwapAcV4, "capwap_ac_v4", Ipv4List;
    139 => MosAddressList, "mos_address_list", MosAddresses;
    140 => MosDomainList, "mos_domain_list", MosDomains;
}

// Conversion helpers between typed values and option bytes.

/// Serialise one IPv4 address
pub fn encode_ipv4(addr: Ipv4Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

/// Serialise a list of IPv4 addresses
pub fn encode_ipv4s(addrs: &[Ipv4Addr]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 * addrs.len());
    for addr in addrs {
        out.extend_from_slice(&addr.octets());
    }
    out
}

/// Serialise a 16-bit value
pub fn encode_u16(value: u16) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Serialise a 32-bit value
pub fn encode_u32(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Serialise text
pub fn encode_string(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

/// Read one IPv4 address, if the value is exactly four bytes
pub fn decode_ipv4(value: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = value.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

/// Read a whole number of IPv4 addresses
pub fn decode_ipv4s(value: &[u8]) -> Option<Vec<Ipv4Addr>> {
    if value.is_empty() || value.len() % 4 != 0 {
        return None;
    }
    Some(
        value
            .chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect(),
    )
}

/// Read a 16-bit value
pub fn decode_u16(value: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(value.try_into().ok()?))
}

/// Read a 32-bit value
pub fn decode_u32(value: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(value.try_into().ok()?))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_consistency() {
        // Every named code has a format, and the enum round-trips
        for code in 0_u8..=255 {
            assert_eq!(option_name(code).is_some(), option_format(code).is_some());
            assert_eq!(u8::from(DhcpOptionKind::from(code)), code);
        }
        // Pad and end are structural, never table entries
        assert!(option_name(0).is_none());
        assert!(option_name(255).is_none());
    }

    #[test]
    fn test_mandatory_options_are_known() {
        for code in MANDATORY_OPTIONS {
            assert!(option_format(code).is_some(), "option {} missing", code);
        }
    }

    #[test]
    fn test_length_rules() {
        assert!(OptionFormat::Ipv4.length_rule().accepts(4));
        assert!(!OptionFormat::Ipv4.length_rule().accepts(8));
        assert!(OptionFormat::Ipv4List.length_rule().accepts(12));
        assert!(!OptionFormat::Ipv4List.length_rule().accepts(10));
        assert!(!OptionFormat::Ipv4List.length_rule().accepts(0));
        assert!(OptionFormat::None.length_rule().accepts(0));
        assert!(!OptionFormat::None.length_rule().accepts(1));
        assert!(OptionFormat::String.length_rule().accepts(0));
        assert!(OptionFormat::Identifier.length_rule().accepts(7));
        assert!(!OptionFormat::Identifier.length_rule().accepts(1));
    }

    #[test]
    fn test_conversion_round_trips() {
        let addr = Ipv4Addr::new(10, 0, 0, 5);
        assert_eq!(decode_ipv4(&encode_ipv4(addr)), Some(addr));
        let addrs = vec![addr, Ipv4Addr::new(10, 0, 0, 6)];
        assert_eq!(decode_ipv4s(&encode_ipv4s(&addrs)), Some(addrs));
        assert_eq!(decode_u32(&encode_u32(3600)), Some(3600));
        assert_eq!(decode_u16(&encode_u16(1500)), Some(1500));
        assert_eq!(decode_ipv4s(&[1, 2, 3]), None);
    }
}
