//! Link layer: Ethernet II frame construction for the raw responder.
//!
//! Diagram at <https://en.wikipedia.org/wiki/Ethernet_frame#Ethernet_II>
//!
//! Frames are only ever assembled here, never parsed: the server receives
//! through ordinary UDP sockets and drops to layer 2 solely to answer
//! clients that do not yet hold an address.

use crate::ip::{IpV4Header, Protocol};
use crate::udp::{calc_udp_checksum, UdpHeader};
use crate::{calc_ip_checksum, IpV4Addr, MacAddr};

use byte_struct::*;
use modular_bitfield::prelude::*;
use static_assertions::const_assert;

const_assert!(EthernetHeader::BYTE_LEN == 14);

/// Header for Ethernet II frame like
///
/// value [0:5] dst macaddr ([0xFF_u8; 6] for broadcast)
///
/// value [6:11] src macaddr
///
/// value [12:13] ethertype
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct EthernetHeader {
    /// Destination MAC address
    pub dst_macaddr: MacAddr,
    /// Source MAC address
    pub src_macaddr: MacAddr,
    /// Payload type
    pub ethertype: EtherType,
}

/// EtherType tag values (incomplete list - there are many more not implemented here)
///
/// See <https://en.wikipedia.org/wiki/EtherType>
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum EtherType {
    /// IPV4
    IpV4 = 0x0800,
    /// ARP
    Arp = 0x0806,
    /// 802.1Q VLAN tag - when present, the real ethertype follows the 2-byte tag control field
    Vlan = 0x8100,
    /// IPV6
    IpV6 = 0x86DD,
    /// Catch-all for uncommon types not handled here
    Unimplemented,
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            x if x == EtherType::IpV4 as u16 => EtherType::IpV4,
            x if x == EtherType::Arp as u16 => EtherType::Arp,
            x if x == EtherType::Vlan as u16 => EtherType::Vlan,
            x if x == EtherType::IpV6 as u16 => EtherType::IpV6,
            _ => EtherType::Unimplemented,
        }
    }
}

impl ByteStructLen for EtherType {
    const BYTE_LEN: usize = 2;
}

impl ByteStruct for EtherType {
    fn read_bytes(bytes: &[u8]) -> Self {
        let mut bytes_read = [0_u8; 2];
        bytes_read.copy_from_slice(&bytes[0..=1]);
        EtherType::from(u16::from_be_bytes(bytes_read))
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        let bytes_to_write = (*self as u16).to_be_bytes();
        bytes[0] = bytes_to_write[0];
        bytes[1] = bytes_to_write[1];
    }
}

/// 802.1Q tag control field.
///
/// value [0:2] priority code point
///
/// value [3] drop eligible indicator
///
/// value [4:15] VLAN identifier
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VlanTag {
    /// VLAN identifier, 1-4094
    pub vid: B12,
    /// Drop eligible indicator
    pub dei: bool,
    /// Priority code point, 0-7
    pub pcp: B3,
}

impl VlanTag {
    /// The tag control information as a 16-bit value for network transmission
    pub fn tci(&self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

/// Assemble a complete Ethernet II frame carrying `payload` inside IPv4/UDP.
///
/// This is the shared core of both raw transports; they differ only in the
/// send primitive. Each qtag expands to a 0x8100 type field followed by its
/// 2-byte tag control field, then the real 0x0800 type closes the header.
///
/// The IPv4 header carries TTL 128 and sets don't-fragment for payloads of
/// at most 560 bytes; IPv4 and UDP checksums are computed in software.
#[allow(clippy::too_many_arguments)]
pub fn assemble_frame(
    payload: &[u8],
    dst_macaddr: MacAddr,
    src_macaddr: MacAddr,
    dst_ipaddr: IpV4Addr,
    src_ipaddr: IpV4Addr,
    dst_port: u16,
    src_port: u16,
    qtags: &[VlanTag],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(
        EthernetHeader::BYTE_LEN + 4 * qtags.len() + IpV4Header::BYTE_LEN + UdpHeader::BYTE_LEN
            + payload.len(),
    );

    // Ethernet header, with any qtags spliced in ahead of the real ethertype
    frame.extend_from_slice(&dst_macaddr.0);
    frame.extend_from_slice(&src_macaddr.0);
    for qtag in qtags {
        frame.extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        frame.extend_from_slice(&qtag.tci().to_be_bytes());
    }
    frame.extend_from_slice(&(EtherType::IpV4 as u16).to_be_bytes());

    // IPv4 header
    let mut ip_header = IpV4Header::new(
        src_ipaddr,
        dst_ipaddr,
        Protocol::Udp,
        (UdpHeader::BYTE_LEN + payload.len()) as u16,
    );
    ip_header.fragmentation = ip_header
        .fragmentation
        .with_do_not_fragment(payload.len() <= 560);
    ip_header.checksum = calc_ip_checksum(&ip_header.to_be_bytes());
    frame.extend_from_slice(&ip_header.to_be_bytes());

    // UDP header
    let mut udp_header = UdpHeader {
        src_port,
        dst_port,
        length: (UdpHeader::BYTE_LEN + payload.len()) as u16,
        checksum: 0,
    };
    udp_header.checksum = calc_udp_checksum(src_ipaddr, dst_ipaddr, &udp_header, payload);
    frame.extend_from_slice(&udp_header.to_be_bytes());

    // Payload
    frame.extend_from_slice(payload);

    frame
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vlan_tag_tci() {
        let qtag = VlanTag::new().with_pcp(5).with_dei(true).with_vid(0x123);
        assert_eq!(qtag.tci(), (5 << 13) | (1 << 12) | 0x123);
    }

    #[test]
    fn test_ethernet_header_serialization_loop() {
        let header = EthernetHeader {
            dst_macaddr: MacAddr::BROADCAST,
            src_macaddr: MacAddr::new([0x02, 0xAF, 0xFF, 0x1A, 0xE5, 0x3C]),
            ethertype: EtherType::IpV4,
        };
        let mut bytes = [0_u8; EthernetHeader::BYTE_LEN];
        header.write_bytes(&mut bytes);
        assert_eq!(EthernetHeader::read_bytes(&bytes), header);
    }

    #[test]
    fn test_assemble_frame_layout() {
        let payload = [1_u8, 2, 3, 4];
        let src_mac = MacAddr::new([0x02, 0, 0, 0, 0, 1]);
        let frame = assemble_frame(
            &payload,
            MacAddr::BROADCAST,
            src_mac,
            IpV4Addr::BROADCAST,
            IpV4Addr::new([10, 0, 0, 1]),
            68,
            67,
            &[],
        );
        assert_eq!(frame.len(), 14 + 20 + 8 + payload.len());
        // Destination MAC, then source, then IPv4 ethertype
        assert_eq!(&frame[0..6], &[0xFF_u8; 6]);
        assert_eq!(&frame[6..12], &src_mac.0);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        // IPv4 header checksum over the header sums to zero
        assert_eq!(crate::calc_ip_checksum(&frame[14..34]), 0);
        // Payload rides at the tail
        assert_eq!(&frame[42..], &payload);
    }

    #[test]
    fn test_assemble_frame_qtags() {
        let qtag = VlanTag::new().with_pcp(1).with_dei(false).with_vid(100);
        let frame = assemble_frame(
            &[0_u8; 8],
            MacAddr::BROADCAST,
            MacAddr::new([0x02, 0, 0, 0, 0, 1]),
            IpV4Addr::BROADCAST,
            IpV4Addr::new([10, 0, 0, 1]),
            68,
            67,
            &[qtag],
        );
        // 0x8100 + tag control, then the real ethertype
        assert_eq!(&frame[12..14], &[0x81, 0x00]);
        assert_eq!(&frame[14..16], &((1_u16 << 13) | 100).to_be_bytes());
        assert_eq!(&frame[16..18], &[0x08, 0x00]);
    }

    #[test]
    fn test_df_tracks_payload_size() {
        let small = assemble_frame(
            &[0_u8; 560],
            MacAddr::BROADCAST,
            MacAddr::ANY,
            IpV4Addr::BROADCAST,
            IpV4Addr::new([10, 0, 0, 1]),
            68,
            67,
            &[],
        );
        let large = assemble_frame(
            &[0_u8; 561],
            MacAddr::BROADCAST,
            MacAddr::ANY,
            IpV4Addr::BROADCAST,
            IpV4Addr::new([10, 0, 0, 1]),
            68,
            67,
            &[],
        );
        // Flags ride in the upper bits of the frag field at offset 20..22
        assert_eq!(small[20] & 0x40, 0x40);
        assert_eq!(large[20] & 0x40, 0x00);
    }
}
