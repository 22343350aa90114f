//! The DHCP packet object: a fixed 240-byte header plus a validated option
//! pool, with the in-place transforms that turn a received request into the
//! reply that goes back on the wire.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use byte_struct::*;
use static_assertions::const_assert;
use thiserror::Error;

use super::options::{self, MANDATORY_OPTIONS};
use super::rfc;
use super::{DhcpOperation, MessageKind, MAGIC_COOKIE};
use crate::{ByteArray, IpV4Addr, MacAddr};

const_assert!(DhcpHeader::BYTE_LEN == 240);

/// Broadcast bit in the `flags` field
pub const FLAGBIT_BROADCAST: u16 = 0b1000_0000_0000_0000;

/// The fixed-length part of the DHCP payload, per IETF-RFC-2131.
/// The options section varies in length and is handled separately.
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct DhcpHeader {
    /// Message op code / message type. 1 = BOOTREQUEST, 2 = BOOTREPLY
    pub op: DhcpOperation,
    /// Hardware type, 1 for ethernet
    pub htype: u8,
    /// Hardware address length, 6 for a standard MAC address
    pub hlen: u8,
    /// Incremented by relay agents
    pub hops: u8,
    /// Transaction ID; assigned by the client; kept the same through a transaction
    pub xid: u32,
    /// Seconds elapsed since client started the transaction
    pub secs: u16,
    /// Bit 15 is the broadcast flag; the rest must be zero
    pub flags: u16,
    /// Client IP address; only set by clients that hold a valid address
    pub ciaddr: IpV4Addr,
    /// "Your" IP address, filled in by the server
    pub yiaddr: IpV4Addr,
    /// Next-server IP address
    pub siaddr: IpV4Addr,
    /// Relay agent IP address
    pub giaddr: IpV4Addr,
    /// Client hardware address; 16 bytes on the wire, of which `hlen` matter
    pub chaddr: ByteArray<16>,
    /// Server host name, rarely used
    pub sname: ByteArray<64>,
    /// Boot file name
    pub file: ByteArray<128>,
    /// "Magic cookie" identifying this as a DHCP message; always 0x63825363
    pub cookie: u32,
}

impl DhcpHeader {
    /// A zeroed BOOTREQUEST header with the magic cookie in place
    pub fn new() -> Self {
        DhcpHeader {
            op: DhcpOperation::Request,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: IpV4Addr::ANY,
            yiaddr: IpV4Addr::ANY,
            siaddr: IpV4Addr::ANY,
            giaddr: IpV4Addr::ANY,
            chaddr: ByteArray([0_u8; 16]),
            sname: ByteArray([0_u8; 64]),
            file: ByteArray([0_u8; 128]),
            cookie: u32::from_be_bytes(MAGIC_COOKIE),
        }
    }
}

impl Default for DhcpHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure to decode a buffer or to set an option value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer cannot hold the fixed header
    #[error("data received does not represent a DHCP packet: {0} bytes")]
    Truncated(usize),
    /// No magic cookie anywhere after the header
    #[error("data received does not represent a DHCP packet: magic cookie not found")]
    MissingCookie,
    /// The option code is not in the table
    #[error("unknown option: {0}")]
    UnknownOption(u8),
    /// The value violates the option's length rule
    #[error("invalid length {length} for option {code}")]
    InvalidLength {
        /// Offending option code
        code: u8,
        /// Rejected value length
        length: usize,
    },
}

/// PXE-specific options stripped from a request, in digested form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PxeOptions {
    /// Option 93: client system architecture codes
    pub client_system: Option<Vec<u16>>,
    /// Option 94: network device interface type/major/minor
    pub client_ndi: Option<(u8, u8, u8)>,
    /// Option 97: identifier type and the identifier itself
    pub uuid_guid: Option<(u8, Vec<u8>)>,
}

/// Vendor options stripped from a request, in digested form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VendorOptions {
    /// Option 43, opaque
    pub specific_information: Option<Vec<u8>>,
    /// Option 60
    pub class_identifier: Option<Vec<u8>>,
    /// Option 124, enterprise-number-keyed
    pub classes: Option<Vec<rfc::VendorClass>>,
    /// Option 125, enterprise-number-keyed sub-options
    pub specific: Option<Vec<rfc::VendorSpecific>>,
}

/// Handles the construction, management, and export of DHCP packets.
///
/// Decoding tolerates padding between the header and the magic cookie,
/// concatenates multi-part options, and records which options the client
/// asked for; [`encode`](Self::encode) is a pure function of the current
/// state and honours request-list filtering, option splitting, and the
/// client's advertised maximum message size.
#[derive(Clone, Debug, PartialEq)]
pub struct DhcpPacket {
    /// The fixed 240-byte header
    pub header: DhcpHeader,
    /// Options by code; values already concatenated across multi-part TLVs
    options: BTreeMap<u8, Vec<u8>>,
    /// Option 55 contents union the mandatory set; None if 55 was absent
    requested_options: Option<BTreeSet<u8>>,
    /// True if the request ended its options with a pad after 255
    received_terminal_pad: bool,
    /// If set, a trailing pad is echoed when the request carried one
    pub terminal_pad: bool,
    /// If set, every option is padded to a 32-bit word boundary
    pub word_align: bool,
    /// min(option 22, option 57), captured before transforms strip both
    max_message_size: Option<u16>,
    /// Send the reply to this MAC rather than the default
    pub response_mac: Option<MacAddr>,
    /// Send the reply to this IP rather than the default
    pub response_ip: Option<Ipv4Addr>,
    /// Send the reply to this port rather than the default
    pub response_port: Option<u16>,
    /// Claim this source port rather than the default
    pub response_source_port: Option<u16>,
}

impl DhcpPacket {
    /// A blank packet: zeroed header, magic cookie, no options
    pub fn new() -> Self {
        DhcpPacket {
            header: DhcpHeader::new(),
            options: BTreeMap::new(),
            requested_options: None,
            received_terminal_pad: false,
            terminal_pad: false,
            word_align: false,
            max_message_size: None,
            response_mac: None,
            response_ip: None,
            response_port: None,
            response_source_port: None,
        }
    }

    /// Parse a received datagram.
    ///
    /// Some clients insert padding between the end of the fixed header and
    /// the magic cookie, so the cookie is located by searching forward from
    /// offset 236. Unknown option codes are skipped with their length
    /// honoured; an option appearing more than once has its values
    /// concatenated.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < DhcpHeader::BYTE_LEN {
            return Err(PacketError::Truncated(data.len()));
        }

        let mut position = 236;
        let end = data.len();
        while position + 4 <= end && data[position..position + 4] != MAGIC_COOKIE {
            position += 1;
        }
        if position + 4 > end {
            return Err(PacketError::MissingCookie);
        }
        position += 4; // Jump to the point immediately after the cookie

        let mut packet = DhcpPacket::new();
        packet.header = DhcpHeader::read_bytes(&data[..DhcpHeader::BYTE_LEN]);
        packet.header.cookie = u32::from_be_bytes(MAGIC_COOKIE);

        while position < end {
            match data[position] {
                0 => position += 1, // Pad option; skip byte
                255 => {
                    // End option; stop processing, noting any trailing pad
                    packet.received_terminal_pad =
                        position + 1 < end && data[position + 1] == 0;
                    break;
                }
                code => {
                    if position + 1 >= end {
                        break;
                    }
                    let length = data[position + 1] as usize;
                    if position + 2 + length > end {
                        break;
                    }
                    let value = &data[position + 2..position + 2 + length];
                    if options::option_format(code).is_some() {
                        packet
                            .options
                            .entry(code)
                            .or_default()
                            .extend_from_slice(value);
                        if code == 55 {
                            let mut requested: BTreeSet<u8> =
                                value.iter().copied().collect();
                            requested.extend(MANDATORY_OPTIONS);
                            packet.requested_options = Some(requested);
                        }
                    }
                    position += 2 + length;
                }
            }
        }

        packet.max_message_size = [22_u8, 57]
            .iter()
            .filter_map(|code| options::decode_u16(packet.get_option(*code)?))
            .min();

        Ok(packet)
    }

    /// Assembles all data into a single wire-ready buffer.
    ///
    /// Options are arranged with message-type (53), server-identifier (54)
    /// and lease-time (51) first, then the rest in ascending code order.
    /// If the client supplied a parameter-request-list, options outside it
    /// and outside the mandatory set are omitted; values longer than 255
    /// bytes are split across successive TLVs with the same code; and the
    /// client's advertised maximum message size is honoured by dropping
    /// optional content, never the mandatory set.
    pub fn encode(&self) -> Vec<u8> {
        const OPTION_ORDERING: [u8; 3] = [53, 54, 51];

        // Serialise each deliverable option into its TLV chunks
        let mut encoded: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for (&code, value) in &self.options {
            if let Some(requested) = &self.requested_options {
                if !requested.contains(&code) {
                    continue;
                }
            }
            let mut chunks = Vec::with_capacity(value.len() + 2);
            let mut remaining = value.as_slice();
            loop {
                if remaining.len() > 255 {
                    chunks.push(code);
                    chunks.push(255);
                    chunks.extend_from_slice(&remaining[..255]);
                    remaining = &remaining[255..];
                } else {
                    chunks.push(code);
                    chunks.push(remaining.len() as u8);
                    chunks.extend_from_slice(remaining);
                    break;
                }
            }
            if self.word_align {
                for _ in 0..(4 - chunks.len() % 4) % 4 {
                    chunks.push(0); // Pad to word boundary
                }
            }
            encoded.insert(code, chunks);
        }

        // Specific options first, then the rest sorted by code
        let mut ordering: Vec<u8> = OPTION_ORDERING
            .iter()
            .copied()
            .filter(|code| encoded.contains_key(code))
            .collect();
        ordering.extend(encoded.keys().copied().filter(|c| !OPTION_ORDERING.contains(c)));

        let trailer_len = 1 + (self.terminal_pad && self.received_terminal_pad) as usize;
        let mut packet = Vec::with_capacity(DhcpHeader::BYTE_LEN + 64);
        packet.resize(DhcpHeader::BYTE_LEN, 0);
        self.header.write_bytes(&mut packet[..DhcpHeader::BYTE_LEN]);

        for code in ordering {
            let chunks = &encoded[&code];
            if let Some(cap) = self.max_message_size {
                let over = packet.len() + chunks.len() + trailer_len > cap as usize;
                if over && !MANDATORY_OPTIONS.contains(&code) {
                    continue; // Optional content yields to the size cap
                }
            }
            packet.extend_from_slice(chunks);
        }

        packet.push(255); // End option
        if self.terminal_pad && self.received_terminal_pad {
            packet.push(0); // Echo the client's trailing pad
        }
        packet
    }

    /// The value of an option, if present
    pub fn get_option(&self, code: u8) -> Option<&[u8]> {
        self.options.get(&code).map(|v| v.as_slice())
    }

    /// Whether an option is currently set
    pub fn is_option(&self, code: u8) -> bool {
        self.options.contains_key(&code)
    }

    /// Validates and sets the value of an option.
    ///
    /// Fixed-length formats reject wrong-length values; variable-length
    /// formats enforce their minimum length and length-multiple.
    pub fn set_option(&mut self, code: u8, value: Vec<u8>) -> Result<(), PacketError> {
        let format = options::option_format(code).ok_or(PacketError::UnknownOption(code))?;
        if !format.length_rule().accepts(value.len()) {
            return Err(PacketError::InvalidLength {
                code,
                length: value.len(),
            });
        }
        self.options.insert(code, value);
        Ok(())
    }

    /// Bypasses length validation and adds the option to the request list,
    /// for forcing poorly designed clients to perform specific tasks
    pub fn force_option(&mut self, code: u8, value: Vec<u8>) -> Result<(), PacketError> {
        if options::option_format(code).is_none() {
            return Err(PacketError::UnknownOption(code));
        }
        if let Some(requested) = &mut self.requested_options {
            requested.insert(code);
        }
        self.options.insert(code, value);
        Ok(())
    }

    /// Drops an option; true if it was present
    pub fn delete_option(&mut self, code: u8) -> bool {
        self.options.remove(&code).is_some()
    }

    /// The options requested by the client, or None if option 55 was omitted
    pub fn requested_options(&self) -> Option<&BTreeSet<u8>> {
        self.requested_options.as_ref()
    }

    /// Whether the client asked for this option (absence of option 55
    /// necessitates delivery of all values)
    pub fn is_requested_option(&self, code: u8) -> bool {
        match &self.requested_options {
            Some(requested) => requested.contains(&code),
            None => true,
        }
    }

    /// min(option 22, option 57) as captured at decode time
    pub fn max_message_size(&self) -> Option<u16> {
        self.max_message_size
    }

    /// The DHCP message type, if option 53 is present and one byte
    pub fn message_kind(&self) -> Option<MessageKind> {
        let value = self.get_option(53)?;
        Some(MessageKind::from(*value.first()?))
    }

    /// A header address field as an address, or None when zeroed
    pub fn ip_field(addr: IpV4Addr) -> Option<Ipv4Addr> {
        if addr == IpV4Addr::ANY {
            return None;
        }
        Some(addr.into())
    }

    /// An option holding a single IPv4 address, or None when absent/zeroed
    pub fn option_ipv4(&self, code: u8) -> Option<Ipv4Addr> {
        let addr = options::decode_ipv4(self.get_option(code)?)?;
        if addr.is_unspecified() {
            return None;
        }
        Some(addr)
    }

    /// The state of a `flags` bit
    pub fn get_flag(&self, bit: u16) -> bool {
        self.header.flags & bit != 0
    }

    /// Sets a `flags` bit, returning (changed, previous-state) so callers
    /// can restore it afterwards
    pub fn set_flag(&mut self, bit: u16, value: bool) -> (bool, bool) {
        let previous = self.get_flag(bit);
        if value {
            self.header.flags |= bit;
        } else {
            self.header.flags &= !bit;
        }
        (previous != value, previous)
    }

    /// Extracts the client's MAC address: the first `hlen` bytes of
    /// `chaddr`, zero-padded when the hardware length runs short
    pub fn hardware_address(&self) -> MacAddr {
        let length = (self.header.hlen as usize).min(6);
        let mut out = [0_u8; 6];
        out[..length].copy_from_slice(&self.header.chaddr.0[..length]);
        MacAddr::new(out)
    }

    /// Sets the client's MAC address, zeroing the remainder of `chaddr`
    pub fn set_hardware_address(&mut self, mac: MacAddr) {
        let mut chaddr = [0_u8; 16];
        chaddr[..6].copy_from_slice(&mac.0);
        self.header.chaddr = ByteArray(chaddr);
    }

    /// Strips out PXE-specific options (93, 94, 97), returning them
    /// separately; good for scrubbing information that should only flow
    /// from the client
    pub fn extract_pxe_options(&mut self) -> PxeOptions {
        let client_system = self.options.remove(&93).map(|value| {
            value
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect()
        });
        let client_ndi = self
            .options
            .remove(&94)
            .filter(|value| value.len() == 3)
            .map(|value| (value[0], value[1], value[2]));
        let uuid_guid = self
            .options
            .remove(&97)
            .filter(|value| !value.is_empty())
            .map(|value| (value[0], value[1..].to_vec()));

        PxeOptions {
            client_system,
            client_ndi,
            uuid_guid,
        }
    }

    /// Strips out vendor options (43, 60, 124, 125), returning them
    /// separately with the enterprise-keyed pair digested
    pub fn extract_vendor_options(&mut self) -> VendorOptions {
        let specific_information = self.options.remove(&43);
        let class_identifier = self.options.remove(&60);
        let classes = self
            .options
            .remove(&124)
            .and_then(|value| rfc::vendor_classes_from_bytes(&value));
        let specific = self
            .options
            .remove(&125)
            .and_then(|value| rfc::vendor_specific_from_bytes(&value));

        VendorOptions {
            specific_information,
            class_identifier,
            classes,
            specific,
        }
    }

    /// Sets and removes options to make the packet suitable for returning
    /// to the client: becomes a reply, and client-originated negotiation
    /// options (22, 50, 55, 57, 61, 118) and `secs` are dropped
    fn transform_base(&mut self) {
        self.header.op = DhcpOperation::Reply;
        self.header.hlen = 6;
        self.header.secs = 0;
        for code in [22, 50, 55, 57, 61, 118] {
            self.options.remove(&code);
        }
    }

    /// Transforms a received packet into an ACK reply
    pub fn transform_to_ack(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![5]);
    }

    /// Transforms a received packet into an OFFER reply
    pub fn transform_to_offer(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![2]);
        self.header.ciaddr = IpV4Addr::ANY;
    }

    /// Transforms a received packet into a NAK reply; a NAK carries no
    /// addresses, no boot fields, and no lease time
    pub fn transform_to_nak(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![6]);
        self.header.ciaddr = IpV4Addr::ANY;
        self.header.siaddr = IpV4Addr::ANY;
        self.header.yiaddr = IpV4Addr::ANY;
        self.header.sname = ByteArray([0_u8; 64]);
        self.header.file = ByteArray([0_u8; 128]);
        self.options.remove(&51);
    }

    /// Transforms a received packet into a LEASEACTIVE reply
    pub fn transform_to_lease_active(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![13]);
        self.header.ciaddr = IpV4Addr::ANY;
        self.header.sname = ByteArray([0_u8; 64]);
        self.header.file = ByteArray([0_u8; 128]);
    }

    /// Transforms a received packet into a LEASEUNASSIGNED reply
    pub fn transform_to_lease_unassigned(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![11]);
        self.header.ciaddr = IpV4Addr::ANY;
        self.header.sname = ByteArray([0_u8; 64]);
        self.header.file = ByteArray([0_u8; 128]);
    }

    /// Transforms a received packet into a LEASEUNKNOWN reply
    pub fn transform_to_lease_unknown(&mut self) {
        self.transform_base();
        self.options.insert(53, vec![12]);
        self.header.ciaddr = IpV4Addr::ANY;
        self.header.sname = ByteArray([0_u8; 64]);
        self.header.file = ByteArray([0_u8; 128]);
    }
}

impl Default for DhcpPacket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A minimal well-formed REQUEST buffer with the given options block
    fn request_bytes(options: &[u8]) -> Vec<u8> {
        let mut packet = DhcpPacket::new();
        packet.header.xid = 0xDEADBEEF;
        packet.set_hardware_address(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let mut bytes = packet.encode();
        bytes.truncate(DhcpHeader::BYTE_LEN); // Drop the end option
        bytes.extend_from_slice(options);
        bytes
    }

    #[test]
    fn test_decode_rejects_non_dhcp() {
        assert_eq!(
            DhcpPacket::decode(&[0_u8; 100]),
            Err(PacketError::Truncated(100))
        );
        // Right size, no cookie anywhere
        assert_eq!(
            DhcpPacket::decode(&[0_u8; 300]),
            Err(PacketError::MissingCookie)
        );
    }

    #[test]
    fn test_decode_tolerates_cookie_padding() {
        let mut bytes = request_bytes(&[53, 1, 3, 255]);
        // Shift the cookie and options three bytes further out
        let tail: Vec<u8> = bytes.split_off(236);
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&tail);

        let packet = DhcpPacket::decode(&bytes).unwrap();
        assert_eq!(packet.message_kind(), Some(MessageKind::Request));
    }

    #[test]
    fn test_decode_concatenates_multipart_options() {
        let bytes = request_bytes(&[53, 1, 1, 43, 2, 0xAA, 0xBB, 43, 1, 0xCC, 255]);
        let packet = DhcpPacket::decode(&bytes).unwrap();
        assert_eq!(packet.get_option(43), Some(&[0xAA, 0xBB, 0xCC][..]));
    }

    #[test]
    fn test_decode_skips_unknown_options() {
        // 224 is site-local and not in the table; its length is honoured
        let bytes = request_bytes(&[224, 2, 1, 2, 53, 1, 1, 255]);
        let packet = DhcpPacket::decode(&bytes).unwrap();
        assert_eq!(packet.message_kind(), Some(MessageKind::Discover));
        assert!(packet.get_option(224).is_none());
    }

    #[test]
    fn test_decode_terminal_pad_and_requested_set() {
        let bytes = request_bytes(&[53, 1, 1, 55, 2, 43, 66, 255, 0]);
        let packet = DhcpPacket::decode(&bytes).unwrap();
        assert!(packet.received_terminal_pad);
        let requested = packet.requested_options().unwrap();
        // Union of the request list and the mandatory set
        for code in [43_u8, 66, 1, 3, 6, 15, 51, 53, 54, 58, 59] {
            assert!(requested.contains(&code), "missing {}", code);
        }
        assert!(!packet.is_requested_option(12));
    }

    #[test]
    fn test_encode_round_trip() {
        let mut packet = DhcpPacket::new();
        packet.header.xid = 0x01020304;
        packet.set_hardware_address(MacAddr::new([2, 0, 0, 0, 0, 7]));
        packet.set_option(53, vec![2]).unwrap();
        packet
            .set_option(54, options::encode_ipv4(Ipv4Addr::new(10, 0, 0, 1)))
            .unwrap();
        packet.set_option(51, options::encode_u32(3600)).unwrap();
        packet
            .set_option(1, options::encode_ipv4(Ipv4Addr::new(255, 255, 255, 0)))
            .unwrap();

        let decoded = DhcpPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.header, packet.header);
        assert_eq!(decoded.get_option(53), packet.get_option(53));
        assert_eq!(decoded.get_option(54), packet.get_option(54));
        assert_eq!(decoded.get_option(51), packet.get_option(51));
        assert_eq!(decoded.get_option(1), packet.get_option(1));
        // Re-encoding an unmutated decode yields the same bytes
        assert_eq!(decoded.encode(), packet.encode());
    }

    #[test]
    fn test_encode_option_ordering() {
        let mut packet = DhcpPacket::new();
        packet.set_option(1, vec![255, 255, 255, 0]).unwrap();
        packet.set_option(53, vec![5]).unwrap();
        packet.set_option(51, vec![0, 0, 14, 16]).unwrap();
        packet.set_option(54, vec![10, 0, 0, 1]).unwrap();
        packet.set_option(3, vec![10, 0, 0, 1]).unwrap();

        let bytes = packet.encode();
        let opts = &bytes[DhcpHeader::BYTE_LEN..];
        // 53, 54, 51 first, then ascending
        assert_eq!(opts[0], 53);
        assert_eq!(opts[3], 54);
        assert_eq!(opts[9], 51);
        assert_eq!(opts[15], 1);
        assert_eq!(opts[21], 3);
        assert_eq!(*opts.last().unwrap(), 255);
    }

    #[test]
    fn test_encode_splits_oversized_options() {
        let mut packet = DhcpPacket::new();
        packet.set_option(43, vec![0x5A; 300]).unwrap();
        let bytes = packet.encode();
        let opts = &bytes[DhcpHeader::BYTE_LEN..];
        // Exactly two TLVs with code 43: lengths 255 then 45
        assert_eq!(opts[0], 43);
        assert_eq!(opts[1], 255);
        assert_eq!(opts[257], 43);
        assert_eq!(opts[258], 45);
        assert_eq!(opts[259 + 45], 255);

        // And the parser glues them back together
        let decoded = DhcpPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.get_option(43).unwrap(), &[0x5A_u8; 300][..]);
    }

    #[test]
    fn test_encode_filters_unrequested_options() {
        let bytes = request_bytes(&[53, 1, 3, 55, 1, 1, 255]);
        let mut packet = DhcpPacket::decode(&bytes).unwrap();
        packet.set_option(1, vec![255, 255, 255, 0]).unwrap();
        packet.set_option(12, b"host".to_vec()).unwrap(); // Not requested
        packet.set_option(54, vec![10, 0, 0, 1]).unwrap(); // Mandatory

        let encoded = packet.encode();
        let reparsed = DhcpPacket::decode(&encoded).unwrap();
        assert!(reparsed.get_option(1).is_some());
        assert!(reparsed.get_option(54).is_some());
        assert!(reparsed.get_option(12).is_none());
    }

    #[test]
    fn test_encode_honours_max_message_size() {
        // Client caps the message at 272 bytes via option 57
        let bytes = request_bytes(&[53, 1, 3, 57, 2, 0x01, 0x10, 255]);
        let mut packet = DhcpPacket::decode(&bytes).unwrap();
        assert_eq!(packet.max_message_size(), Some(272));
        packet.transform_to_ack();
        packet.set_option(54, vec![10, 0, 0, 1]).unwrap();
        packet.set_option(51, vec![0, 0, 14, 16]).unwrap();
        // 200 bytes of optional content cannot fit under the cap
        packet.set_option(43, vec![0xEE; 200]).unwrap();

        let encoded = packet.encode();
        assert!(encoded.len() <= 272);
        let reparsed = DhcpPacket::decode(&encoded).unwrap();
        assert!(reparsed.get_option(43).is_none());
        // The mandatory set always survives
        assert!(reparsed.get_option(53).is_some());
        assert!(reparsed.get_option(54).is_some());
        assert!(reparsed.get_option(51).is_some());
    }

    #[test]
    fn test_terminal_pad_echo_is_opt_in() {
        let bytes = request_bytes(&[53, 1, 3, 255, 0]);
        let mut packet = DhcpPacket::decode(&bytes).unwrap();
        assert!(!packet.encode().ends_with(&[255, 0]));
        packet.terminal_pad = true;
        assert!(packet.encode().ends_with(&[255, 0]));
    }

    #[test]
    fn test_set_option_validates_lengths() {
        let mut packet = DhcpPacket::new();
        assert_eq!(
            packet.set_option(1, vec![255, 255]),
            Err(PacketError::InvalidLength { code: 1, length: 2 })
        );
        assert_eq!(
            packet.set_option(6, vec![10, 0, 0, 1, 10, 0]),
            Err(PacketError::InvalidLength { code: 6, length: 6 })
        );
        assert_eq!(packet.set_option(224, vec![1]), Err(PacketError::UnknownOption(224)));
        assert!(packet.set_option(80, vec![]).is_ok());
        assert!(packet.set_option(6, vec![10, 0, 0, 1, 10, 0, 0, 2]).is_ok());
    }

    #[test]
    fn test_hardware_address_short_hlen() {
        let mut packet = DhcpPacket::new();
        packet.set_hardware_address(MacAddr::new([1, 2, 3, 4, 5, 6]));
        packet.header.hlen = 4;
        assert_eq!(packet.hardware_address(), MacAddr::new([1, 2, 3, 4, 0, 0]));
    }

    #[test]
    fn test_transforms() {
        let bytes = request_bytes(&[
            53, 1, 3, // REQUEST
            50, 4, 10, 0, 0, 5, // requested IP
            55, 1, 1, // parameter request list
            57, 2, 2, 64, // max message size
            61, 7, 1, 2, 0, 0, 0, 0, 1, // client identifier
            255,
        ]);
        let mut packet = DhcpPacket::decode(&bytes).unwrap();
        packet.header.ciaddr = IpV4Addr::new([10, 0, 0, 5]);
        packet.header.secs = 42;

        let mut ack = packet.clone();
        ack.transform_to_ack();
        assert_eq!(ack.header.op, DhcpOperation::Reply);
        assert_eq!(ack.header.secs, 0);
        assert_eq!(ack.message_kind(), Some(MessageKind::Ack));
        for code in [50, 55, 57, 61] {
            assert!(!ack.is_option(code), "option {} should be stripped", code);
        }
        // The request list still filters the encoded reply
        assert!(ack.requested_options().is_some());

        let mut nak = packet.clone();
        nak.header.yiaddr = IpV4Addr::new([10, 0, 0, 5]);
        nak.set_option(51, vec![0, 0, 14, 16]).unwrap();
        nak.transform_to_nak();
        assert_eq!(nak.message_kind(), Some(MessageKind::Nak));
        assert_eq!(nak.header.ciaddr, IpV4Addr::ANY);
        assert_eq!(nak.header.yiaddr, IpV4Addr::ANY);
        assert_eq!(nak.header.siaddr, IpV4Addr::ANY);
        assert!(!nak.is_option(51));

        let mut offer = packet.clone();
        offer.transform_to_offer();
        assert_eq!(offer.message_kind(), Some(MessageKind::Offer));
        assert_eq!(offer.header.ciaddr, IpV4Addr::ANY);

        let mut unassigned = packet;
        unassigned.transform_to_lease_unassigned();
        assert_eq!(unassigned.message_kind(), Some(MessageKind::LeaseUnassigned));
    }

    #[test]
    fn test_pxe_and_vendor_extraction() {
        let bytes = request_bytes(&[
            53, 1, 1, //
            93, 2, 0, 7, // client system: EFI x64
            94, 3, 1, 2, 1, // NDI
            97, 5, 0, 1, 2, 3, 4, // UUID
            60, 9, b'P', b'X', b'E', b'C', b'l', b'i', b'e', b'n', b't', //
            255,
        ]);
        let mut packet = DhcpPacket::decode(&bytes).unwrap();
        let pxe = packet.extract_pxe_options();
        assert_eq!(pxe.client_system, Some(vec![7]));
        assert_eq!(pxe.client_ndi, Some((1, 2, 1)));
        assert_eq!(pxe.uuid_guid, Some((0, vec![1, 2, 3, 4])));
        assert!(!packet.is_option(93));

        let vendor = packet.extract_vendor_options();
        assert_eq!(vendor.class_identifier, Some(b"PXEClient".to_vec()));
        assert!(!packet.is_option(60));
    }

    #[test]
    fn test_flag_save_restore() {
        let mut packet = DhcpPacket::new();
        let (changed, original) = packet.set_flag(FLAGBIT_BROADCAST, true);
        assert!(changed);
        assert!(!original);
        let (changed, _) = packet.set_flag(FLAGBIT_BROADCAST, true);
        assert!(!changed);
        // Restoring the saved state brings the bit back down
        packet.set_flag(FLAGBIT_BROADCAST, original);
        assert!(!packet.get_flag(FLAGBIT_BROADCAST));
    }
}
