//! Builders and parsers for the composite option formats defined outside
//! IETF-RFC-2132.
//!
//! Builders produce the raw value bytes for
//! [`DhcpPacket::set_option`](crate::dhcp::packet::DhcpPacket::set_option);
//! parsers digest client-supplied values into structured form.
//!
//! Coverage: RFC-1035 name lists (15/88/119/137), RFC-2610 SLP (78/79),
//! RFC-3046 relay agent (82), RFC-3361 SIP servers (120), RFC-3442
//! classless routes (121), RFC-3925 vendor-identifying options (124/125),
//! RFC-4174 iSNS (83), RFC-5678 MoS (139/140).

use std::net::Ipv4Addr;

/// Split an FQDN on dots and emit length-prefixed labels with a terminal
/// zero, per IETF-RFC-1035: `"google.ca"` becomes
/// `[6, g, o, o, g, l, e, 2, c, a, 0]`.
pub fn name_to_rfc1035(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// Concatenated RFC-1035 names, as used by options 88, 119, and 137
pub fn names_to_rfc1035(names: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(&name_to_rfc1035(name));
    }
    out
}

/// Parse concatenated RFC-1035 names, honouring 0xC0 compression pointers.
///
/// Returns None on truncation, a pointer loop, or non-UTF8 labels.
pub fn names_from_rfc1035(value: &[u8]) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut position = 0;
    while position < value.len() {
        let (name, next) = read_name(value, position, 0)?;
        names.push(name);
        position = next;
    }
    Some(names)
}

/// Read one possibly-compressed name starting at `position`; returns the
/// name and the offset just past its in-line representation.
fn read_name(value: &[u8], mut position: usize, depth: u8) -> Option<(String, usize)> {
    // A chain of pointers longer than the buffer can only be a loop
    if depth > 16 {
        return None;
    }
    let mut labels: Vec<String> = Vec::new();
    loop {
        let len = *value.get(position)? as usize;
        if len == 0 {
            position += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = *value.get(position + 1)? as usize;
            let target = ((len & 0x3F) << 8) | low;
            let (suffix, _) = read_name(value, target, depth + 1)?;
            labels.push(suffix);
            position += 2;
            return Some((labels.join("."), position));
        }
        let label = value.get(position + 1..position + 1 + len)?;
        labels.push(String::from_utf8(label.to_vec()).ok()?);
        position += 1 + len;
    }
    Some((labels.join("."), position))
}

/// Option 78 (IETF-RFC-2610): SLP directory agents, a mandatory byte
/// followed by IPv4 addresses
pub fn slp_directory_agent(mandatory: bool, addrs: &[Ipv4Addr]) -> Vec<u8> {
    let mut out = vec![mandatory as u8];
    for addr in addrs {
        out.extend_from_slice(&addr.octets());
    }
    out
}

/// Option 79 (IETF-RFC-2610): SLP service scope, a mandatory byte followed
/// by a UTF-8 scope list
pub fn slp_service_scope(mandatory: bool, scope_list: &str) -> Vec<u8> {
    let mut out = vec![mandatory as u8];
    out.extend_from_slice(scope_list.as_bytes());
    out
}

/// A relay agent sub-option from option 82 (IETF-RFC-3046)
pub type RelaySubOption = (u8, Vec<u8>);

/// Parse option 82 (IETF-RFC-3046) into its sub-options.
/// Sub-option 1 is the circuit ID, 2 the remote ID.
pub fn relay_agent_from_bytes(value: &[u8]) -> Option<Vec<RelaySubOption>> {
    let mut out = Vec::new();
    let mut position = 0;
    while position < value.len() {
        let code = value[position];
        let len = *value.get(position + 1)? as usize;
        let data = value.get(position + 2..position + 2 + len)?;
        out.push((code, data.to_vec()));
        position += 2 + len;
    }
    Some(out)
}

/// SIP server configuration for option 120 (IETF-RFC-3361): the value is
/// either a list of addresses or a list of names, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SipServers {
    /// Encoding 1: IPv4 addresses
    Addresses(Vec<Ipv4Addr>),
    /// Encoding 0: RFC-1035 domain names
    Domains(Vec<String>),
}

/// Build option 120 (IETF-RFC-3361)
pub fn sip_servers(servers: &SipServers) -> Vec<u8> {
    match servers {
        SipServers::Addresses(addrs) => {
            let mut out = vec![1_u8];
            for addr in addrs {
                out.extend_from_slice(&addr.octets());
            }
            out
        }
        SipServers::Domains(names) => {
            let mut out = vec![0_u8];
            for name in names {
                out.extend_from_slice(&name_to_rfc1035(name));
            }
            out
        }
    }
}

/// A classless static route: destination, prefix length, router
pub type ClasslessRoute = (Ipv4Addr, u8, Ipv4Addr);

/// Build option 121 (IETF-RFC-3442): each route carries only the
/// significant octets of its destination, sized from the prefix length
pub fn classless_routes(routes: &[ClasslessRoute]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(destination, prefix, router) in routes {
        let prefix = prefix.min(32);
        out.push(prefix);
        let significant = (prefix as usize + 7) / 8;
        out.extend_from_slice(&destination.octets()[..significant]);
        out.extend_from_slice(&router.octets());
    }
    out
}

/// Parse option 121 (IETF-RFC-3442)
pub fn classless_routes_from_bytes(value: &[u8]) -> Option<Vec<ClasslessRoute>> {
    let mut out = Vec::new();
    let mut position = 0;
    while position < value.len() {
        let prefix = value[position];
        if prefix > 32 {
            return None;
        }
        let significant = (prefix as usize + 7) / 8;
        let mut destination = [0_u8; 4];
        destination[..significant]
            .copy_from_slice(value.get(position + 1..position + 1 + significant)?);
        let router = value.get(position + 1 + significant..position + 5 + significant)?;
        out.push((
            Ipv4Addr::from(destination),
            prefix,
            Ipv4Addr::new(router[0], router[1], router[2], router[3]),
        ));
        position += 5 + significant;
    }
    Some(out)
}

/// An enterprise-keyed payload from option 124 (IETF-RFC-3925)
pub type VendorClass = (u32, Vec<u8>);
/// An enterprise-keyed sub-option set from option 125 (IETF-RFC-3925)
pub type VendorSpecific = (u32, Vec<(u8, Vec<u8>)>);

/// Build option 124 (IETF-RFC-3925): enterprise number, then
/// length-prefixed vendor class data
pub fn vendor_classes(classes: &[(u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(enterprise, data) in classes {
        out.extend_from_slice(&enterprise.to_be_bytes());
        out.push(data.len() as u8);
        out.extend_from_slice(data);
    }
    out
}

/// Parse option 124 (IETF-RFC-3925)
pub fn vendor_classes_from_bytes(value: &[u8]) -> Option<Vec<VendorClass>> {
    let mut out = Vec::new();
    let mut position = 0;
    while position < value.len() {
        let enterprise = u32::from_be_bytes(value.get(position..position + 4)?.try_into().ok()?);
        let len = *value.get(position + 4)? as usize;
        let data = value.get(position + 5..position + 5 + len)?;
        out.push((enterprise, data.to_vec()));
        position += 5 + len;
    }
    Some(out)
}

/// Build option 125 (IETF-RFC-3925): enterprise number, then a
/// length-prefixed block of TLV sub-options
pub fn vendor_specific(blocks: &[(u32, &[(u8, &[u8])])]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(enterprise, subopts) in blocks {
        out.extend_from_slice(&enterprise.to_be_bytes());
        let payload_len: usize = subopts.iter().map(|(_, d)| 2 + d.len()).sum();
        out.push(payload_len as u8);
        for &(code, data) in subopts {
            out.push(code);
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
    }
    out
}

/// Parse option 125 (IETF-RFC-3925)
pub fn vendor_specific_from_bytes(value: &[u8]) -> Option<Vec<VendorSpecific>> {
    let mut out = Vec::new();
    let mut position = 0;
    while position < value.len() {
        let enterprise = u32::from_be_bytes(value.get(position..position + 4)?.try_into().ok()?);
        let len = *value.get(position + 4)? as usize;
        let payload = value.get(position + 5..position + 5 + len)?;
        let mut subopts = Vec::new();
        let mut sub_position = 0;
        while sub_position < payload.len() {
            let code = payload[sub_position];
            let sub_len = *payload.get(sub_position + 1)? as usize;
            let data = payload.get(sub_position + 2..sub_position + 2 + sub_len)?;
            subopts.push((code, data.to_vec()));
            sub_position += 2 + sub_len;
        }
        out.push((enterprise, subopts));
        position += 5 + len;
    }
    Some(out)
}

/// Build option 83 (IETF-RFC-4174): iSNS functions, discovery-domain
/// access, administrative flags, security bitmap, then server addresses
pub fn isns(
    functions: u16,
    dd_access: u16,
    admin_flags: u16,
    security: u32,
    addrs: &[Ipv4Addr],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + 4 * addrs.len());
    out.extend_from_slice(&functions.to_be_bytes());
    out.extend_from_slice(&dd_access.to_be_bytes());
    out.extend_from_slice(&admin_flags.to_be_bytes());
    out.extend_from_slice(&security.to_be_bytes());
    for addr in addrs {
        out.extend_from_slice(&addr.octets());
    }
    out
}

/// Build option 139 (IETF-RFC-5678): sub-option codes with IPv4 lists
pub fn mos_addresses(entries: &[(u8, &[Ipv4Addr])]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(code, addrs) in entries {
        out.push(code);
        for addr in addrs {
            out.extend_from_slice(&addr.octets());
        }
    }
    out
}

/// Build option 140 (IETF-RFC-5678): sub-option codes with RFC-1035 names
pub fn mos_domains(entries: &[(u8, &[&str])]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(code, names) in entries {
        out.push(code);
        out.extend_from_slice(&names_to_rfc1035(names));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rfc1035_encode() {
        assert_eq!(
            name_to_rfc1035("google.ca"),
            [
                6, b'g', b'o', b'o', b'g', b'l', b'e', 2, b'c', b'a', 0
            ]
        );
    }

    #[test]
    fn test_rfc1035_round_trip() {
        let value = names_to_rfc1035(&["example.org", "sub.example.org"]);
        assert_eq!(
            names_from_rfc1035(&value).unwrap(),
            vec!["example.org".to_string(), "sub.example.org".to_string()]
        );
    }

    #[test]
    fn test_rfc1035_compression_pointer() {
        // "example.org" at 0, then "www" + pointer back to offset 0
        let mut value = name_to_rfc1035("example.org");
        let pointer_target = 0_u16;
        value.push(3);
        value.extend_from_slice(b"www");
        value.extend_from_slice(&(0xC000_u16 | pointer_target).to_be_bytes());
        assert_eq!(
            names_from_rfc1035(&value).unwrap(),
            vec!["example.org".to_string(), "www.example.org".to_string()]
        );
    }

    #[test]
    fn test_rfc1035_pointer_loop_rejected() {
        // A pointer that targets itself must not recurse forever
        let value = [0xC0_u8, 0x00];
        assert!(names_from_rfc1035(&value).is_none());
    }

    #[test]
    fn test_slp_directory_agent() {
        let value = slp_directory_agent(true, &[Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(value, [1, 10, 0, 0, 1]);
    }

    #[test]
    fn test_sip_servers_modes() {
        let addrs = sip_servers(&SipServers::Addresses(vec![Ipv4Addr::new(10, 0, 0, 9)]));
        assert_eq!(addrs, [1, 10, 0, 0, 9]);
        let names = sip_servers(&SipServers::Domains(vec!["sip.example.org".into()]));
        assert_eq!(names[0], 0);
        assert_eq!(names[1], 3);
    }

    #[test]
    fn test_classless_routes_round_trip() {
        let routes = vec![
            (Ipv4Addr::new(10, 0, 0, 0), 8, Ipv4Addr::new(10, 0, 0, 1)),
            (Ipv4Addr::new(192, 168, 4, 0), 22, Ipv4Addr::new(10, 0, 0, 2)),
            (Ipv4Addr::UNSPECIFIED, 0, Ipv4Addr::new(10, 0, 0, 3)),
        ];
        let value = classless_routes(&routes);
        // /8 -> 1 significant octet, /22 -> 3, /0 -> 0
        assert_eq!(value.len(), 6 + 8 + 5);
        assert_eq!(classless_routes_from_bytes(&value).unwrap(), routes);
    }

    #[test]
    fn test_vendor_options_round_trip() {
        let classes = vendor_classes(&[(2495, b"PXE")]);
        assert_eq!(
            vendor_classes_from_bytes(&classes).unwrap(),
            vec![(2495, b"PXE".to_vec())]
        );

        let specific = vendor_specific(&[(2495, &[(1, &[0xAA_u8, 0xBB][..])])]);
        assert_eq!(
            vendor_specific_from_bytes(&specific).unwrap(),
            vec![(2495, vec![(1, vec![0xAA, 0xBB])])]
        );
    }

    #[test]
    fn test_relay_agent_parse() {
        let value = [1_u8, 2, 0xAA, 0xBB, 2, 1, 0xCC];
        assert_eq!(
            relay_agent_from_bytes(&value).unwrap(),
            vec![(1, vec![0xAA, 0xBB]), (2, vec![0xCC])]
        );
        // Truncated sub-option
        assert!(relay_agent_from_bytes(&[1, 5, 0xAA]).is_none());
    }

    #[test]
    fn test_isns_layout() {
        let value = isns(1, 2, 3, 4, &[Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(value, [0, 1, 0, 2, 0, 3, 0, 0, 0, 4, 10, 0, 0, 1]);
    }

    #[test]
    fn test_mos_entries() {
        let value = mos_addresses(&[(1, &[Ipv4Addr::new(10, 0, 0, 1)][..])]);
        assert_eq!(value, [1, 10, 0, 0, 1]);
        let value = mos_domains(&[(2, &["a.b"][..])]);
        assert_eq!(value, [2, 1, b'a', 1, b'b', 0]);
    }
}
