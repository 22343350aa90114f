//! A static DHCPv4 server core.
//!
//! Answers DHCP requests by looking the client's hardware address up in a
//! pre-provisioned mapping and returning a deterministic, administrator-defined
//! IPv4 configuration. There are no address pools and no lease state: every
//! assignment is a pure function of the client's MAC and the reference
//! database, which makes assignments auditable and reproducible.
//!
//! The crate is organised by network layer, bottom up: [`enet`], [`ip`] and
//! [`udp`] build the raw Ethernet frames used to answer clients that do not
//! yet have an address, [`dhcp`] holds the wire codec and option tables,
//! [`link`] owns the sockets and picks the right responder for each reply,
//! [`engine`] implements the protocol state logic, and [`server`] ties the
//! receive loop, per-packet tasks and the once-per-second maintenance tick
//! together.
//!
//! ```rust
//! use staticdhcp::{ByteArray, MacAddr};
//!
//! let mac: MacAddr = "02:af:ff:1a:e5:3c".parse().unwrap();
//! assert_eq!(mac, ByteArray([0x02, 0xAF, 0xFF, 0x1A, 0xE5, 0x3C]));
//! assert_eq!(mac.to_string(), "02:af:ff:1a:e5:3c");
//! ```

#![deny(missing_docs)]

use core::fmt;
use core::str::FromStr;
use std::net::Ipv4Addr;

pub use byte_struct::{ByteStruct, ByteStructLen};
pub use modular_bitfield;

pub mod enet; // Link layer
pub mod ip; // Internet layer
pub mod udp; // Transport layer

pub mod dhcp; // Wire codec: packet, option tables, RFC helpers

pub mod abuse; // Per-MAC accounting and temporary blacklists
pub mod config; // Configuration and operator hooks
pub mod db; // Database interface and cache chain
pub mod engine; // Request/response state logic
pub mod link; // Sockets and responders
pub mod server; // Receive loop and tick scheduling
pub mod stats; // Per-packet statistics sink

pub use config::{Config, Hooks};
pub use db::{Database, Definition};
pub use dhcp::packet::DhcpPacket;
pub use dhcp::{DhcpOperation, MessageKind};
pub use engine::DhcpEngine;
pub use server::DhcpService;

/// Standard 6-byte MAC address.
/// Split 24/24 format, Block ID | Device ID .
/// Locally-administered addresses are [0x02, ...], [0x06, ...], [0x0A, ...], [0x0E, ...]
pub type MacAddr = ByteArray<6>;

impl MacAddr {
    /// New from bytes
    pub fn new(v: [u8; 6]) -> Self {
        ByteArray(v)
    }

    /// Broadcast address (all ones)
    pub const BROADCAST: MacAddr = ByteArray([0xFF_u8; 6]);

    /// Any address (all zeroes)
    pub const ANY: MacAddr = ByteArray([0x0_u8; 6]);

    /// The 48-bit value as an integer, used as a compact cache key.
    pub fn as_u64(&self) -> u64 {
        let mut out = [0_u8; 8];
        out[2..8].copy_from_slice(&self.0);
        u64::from_be_bytes(out)
    }
}

/// Canonical rendering: lowercase, colon-separated.
impl fmt::Display for ByteArray<6> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Failure to parse a textual MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a MAC address: {input}")]
pub struct MacParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ByteArray<6> {
    type Err = MacParseError;

    /// Accepts colon- or dash-separated pairs in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MacParseError {
            input: s.to_string(),
        };
        let mut out = [0_u8; 6];
        let mut n = 0;
        for part in s.split(|c| c == ':' || c == '-') {
            if n == 6 || part.len() != 2 {
                return Err(err());
            }
            out[n] = u8::from_str_radix(part, 16).map_err(|_| err())?;
            n += 1;
        }
        if n != 6 {
            return Err(err());
        }
        Ok(ByteArray(out))
    }
}

/// IPV4 address as bytes
pub type IpV4Addr = ByteArray<4>;

impl IpV4Addr {
    /// New from bytes
    pub fn new(v: [u8; 4]) -> Self {
        ByteArray(v)
    }

    /// Broadcast address (all ones)
    pub const BROADCAST: IpV4Addr = ByteArray([0xFF_u8; 4]);

    /// Any address (all zeroes)
    pub const ANY: IpV4Addr = ByteArray([0x0_u8; 4]);

    /// True for anything other than the all-zeroes and all-ones sentinels.
    pub fn is_specified(&self) -> bool {
        *self != Self::ANY && *self != Self::BROADCAST
    }
}

impl fmt::Display for ByteArray<4> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl From<Ipv4Addr> for ByteArray<4> {
    fn from(addr: Ipv4Addr) -> Self {
        ByteArray(addr.octets())
    }
}

impl From<ByteArray<4>> for Ipv4Addr {
    fn from(addr: ByteArray<4>) -> Self {
        Ipv4Addr::from(addr.0)
    }
}

/// The "unspecified filter": true if `ip` is one of the sentinels that mark a
/// broadcast-originated source (`0.0.0.0` or `255.255.255.255`).
pub fn is_unspecified(ip: Ipv4Addr) -> bool {
    ip.is_unspecified() || ip == Ipv4Addr::BROADCAST
}

/// Newtype for [u8; N] in order to be able to implement traits.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ByteArray<const N: usize>(pub [u8; N]);

impl<const N: usize> ByteStructLen for ByteArray<N> {
    const BYTE_LEN: usize = N;
}

impl<const N: usize> ByteStruct for ByteArray<N> {
    fn read_bytes(bytes: &[u8]) -> Self {
        let mut out = [0_u8; N];
        out.copy_from_slice(&bytes[0..N]);
        ByteArray(out)
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0..N].copy_from_slice(&self.0);
    }
}

impl<const N: usize> ByteArray<N> {
    /// Convert to big-endian byte array
    pub fn to_be_bytes(&self) -> [u8; N] {
        self.0
    }
}

/// Derive To/From with an added "Unknown" variant catch-all for converting
/// from numerical values that do not match a valid variant in order to
/// avoid either panicking or cumbersome error handling.
///
/// Yoinked shamelessly (with some modification) from smoltcp.
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// Catch-all for values that do not match a variant
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// Calculate IP checksum per IETF-RFC-768
/// following implementation guide in IETF-RFC-1071 section 4.1 .
/// See <https://datatracker.ietf.org/doc/html/rfc1071#section-4> .
pub fn calc_ip_checksum(data: &[u8]) -> u16 {
    // Partial calc
    let sum = calc_ip_checksum_incomplete(data);
    // Fold and flip
    calc_ip_checksum_finalize(sum)
}

/// Finalize an IP checksum by folding the accumulator from a [u32]
/// to a [u16] and taking the one's complement
pub fn calc_ip_checksum_finalize(sum: u32) -> u16 {
    // Copy to avoid mutating the input, which may be used for something else
    // since some checksums relate to overlapping data
    let mut sum = sum;

    // Fold 32-bit accumulator into 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    // Convert to u16 and take bitwise complement
    !(sum as u16)
}

/// Calculate an IP checksum on incomplete data
/// returning the unfolded accumulator as [u32]
pub fn calc_ip_checksum_incomplete(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;

    for (i, x) in data.iter().enumerate() {
        if i % 2 == 0 {
            sum += (*x as u32) << 8;
        } else {
            sum += *x as u32;
        };
    }

    sum
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mac_render_and_parse() {
        let mac = MacAddr::new([0x02, 0x00, 0xAB, 0x00, 0x00, 0x01]);
        let rendered = mac.to_string();
        assert_eq!(rendered, "02:00:ab:00:00:01");
        assert_eq!(rendered.parse::<MacAddr>().unwrap(), mac);
        assert_eq!("02-00-AB-00-00-01".parse::<MacAddr>().unwrap(), mac);
        assert!("02:00:ab:00:00".parse::<MacAddr>().is_err());
        assert!("02:00:ab:00:00:zz".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_as_u64() {
        let mac = MacAddr::new([0, 0, 0, 0, 1, 2]);
        assert_eq!(mac.as_u64(), 0x0102);
    }

    #[test]
    fn test_unspecified_filter() {
        assert!(is_unspecified(Ipv4Addr::UNSPECIFIED));
        assert!(is_unspecified(Ipv4Addr::BROADCAST));
        assert!(!is_unspecified(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_calc_ip_checksum() {
        // A header that already carries its own checksum sums to zero
        let mut header: [u8; 8] = [0x45, 0x00, 0x00, 0x1c, 0xde, 0xad, 0x00, 0x00];
        let checksum = calc_ip_checksum(&header);
        header[6..8].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(calc_ip_checksum(&header), 0);
    }
}
