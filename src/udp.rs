//! Transport layer: User Datagram Protocol

use crate::ip::Protocol;
use crate::{calc_ip_checksum_finalize, calc_ip_checksum_incomplete, IpV4Addr};

use byte_struct::*;
use static_assertions::const_assert;

const_assert!(UdpHeader::BYTE_LEN == 8);

/// UDP datagram header structure like
///
/// value [0:1] source port [u16]
///
/// value [2:3] destination port [u16]
///
/// value [4:5] total length in bytes [u16], header + data
///
/// value [6:7] checksum [u16]
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Total length including header and data
    pub length: u16,
    /// RFC-768 checksum over the pseudo-header, header, and data
    pub checksum: u16,
}

impl UdpHeader {
    /// Pack into big-endian (network) byte array
    pub fn to_be_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut header_bytes = [0_u8; Self::BYTE_LEN];
        self.write_bytes(&mut header_bytes);
        header_bytes
    }
}

/// Calculate the UDP checksum over the IPv4 pseudo-header, the UDP header
/// (with its checksum field zeroed) and the payload, per IETF-RFC-768.
pub fn calc_udp_checksum(
    src_ipaddr: IpV4Addr,
    dst_ipaddr: IpV4Addr,
    header: &UdpHeader,
    data: &[u8],
) -> u16 {
    let mut zeroed = *header;
    zeroed.checksum = 0;

    let mut sum = calc_ip_checksum_incomplete(&src_ipaddr.0);
    sum += calc_ip_checksum_incomplete(&dst_ipaddr.0);
    sum += Protocol::Udp as u32; // Zero pad byte, then protocol number
    sum += header.length as u32;
    sum += calc_ip_checksum_incomplete(&zeroed.to_be_bytes());
    sum += calc_ip_checksum_incomplete(data);

    calc_ip_checksum_finalize(sum)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_serialization_loop() {
        let header = UdpHeader {
            src_port: 67,
            dst_port: 68,
            length: 8 + 4,
            checksum: 0xBEEF,
        };
        let bytes = header.to_be_bytes();
        assert_eq!(UdpHeader::read_bytes(&bytes), header);
    }

    #[test]
    fn test_udp_checksum_validates() {
        let data = [0xDE_u8, 0xAD, 0xBE, 0xEF, 0x01];
        let src = IpV4Addr::new([10, 0, 0, 1]);
        let dst = IpV4Addr::new([10, 0, 0, 2]);
        let mut header = UdpHeader {
            src_port: 67,
            dst_port: 68,
            length: (UdpHeader::BYTE_LEN + data.len()) as u16,
            checksum: 0,
        };
        header.checksum = calc_udp_checksum(src, dst, &header, &data);

        // Receiver-side verification: summing everything including the
        // transmitted checksum comes out to zero
        let mut sum = calc_ip_checksum_incomplete(&src.0);
        sum += calc_ip_checksum_incomplete(&dst.0);
        sum += Protocol::Udp as u32;
        sum += header.length as u32;
        sum += calc_ip_checksum_incomplete(&header.to_be_bytes());
        sum += calc_ip_checksum_incomplete(&data);
        assert_eq!(calc_ip_checksum_finalize(sum), 0);
    }
}
