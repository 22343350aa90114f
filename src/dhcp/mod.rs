//! Dynamic Host Configuration Protocol wire codec for IPV4.
//!
//! Server side of the call-response structure used to hand out IP addresses
//! on a local network, per IETF-RFC-2131 with RFC-2132 option encoding; see
//! <https://datatracker.ietf.org/doc/html/rfc2131#page-22>
//!
//! [`packet`] carries the packet object with its decode/encode and reply
//! transforms, [`options`] the authoritative option table, and [`rfc`] the
//! helpers for the composite option formats defined outside RFC-2132.

use crate::enum_with_unknown;
use byte_struct::*;

pub mod options;
pub mod packet;
pub mod rfc;

/// The port on which DHCP servers and relays listen
pub const DHCP_SERVER_PORT: u16 = 67;
/// The port on which DHCP clients listen
pub const DHCP_CLIENT_PORT: u16 = 68;
/// The port on which proxy-DHCP/PXE servers conventionally listen
pub const DHCP_PROXY_PORT: u16 = 4011;

/// "Magic cookie" marking the start of the options block, at offset 236
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

enum_with_unknown! {
    /// Message op code / message type. 1 = BOOTREQUEST, 2 = BOOTREPLY
    /// Legacy operation type field from BOOTP.
    /// Still has to match and change value depending on message type even though
    /// there is only one valid combination of message type and operation.
    pub enum DhcpOperation(u8) {
        /// Anything coming from the client
        Request = 1,
        /// Anything coming from the server
        Reply = 2
    }
}

impl ByteStructLen for DhcpOperation {
    const BYTE_LEN: usize = 1;
}

impl ByteStruct for DhcpOperation {
    fn read_bytes(bytes: &[u8]) -> Self {
        Self::from(bytes[0])
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0] = u8::from(*self);
    }
}

enum_with_unknown! {
    /// Contents of option field kind 53
    pub enum MessageKind(u8) {
        /// Client broadcast to locate available servers.
        Discover = 1,
        /// Server to client in response to DHCPDISCOVER with offer of configuration parameters.
        Offer = 2,
        /// Client message to servers either (a) requesting
        /// offered parameters from one server and implicitly
        /// declining offers from all others, (b) confirming
        /// correctness of previously allocated address after,
        /// e.g., system reboot, or (c) extending the lease on a
        /// particular network address.
        Request = 3,
        /// Client to server indicating network address is already in use.
        Decline = 4,
        /// Server to client with configuration parameters, including committed network address.
        Ack = 5, // Acknowledge
        /// Server to client indicating client's notion of network address is incorrect
        /// (e.g., client has moved to new subnet) or client's lease as expired
        Nak = 6, // Negative-acknowledge
        /// Client to server relinquishing network address and cancelling remaining lease.
        Release = 7,
        /// Client to server, asking only for local configuration parameters.
        /// Client already has externally configured network address.
        Inform = 8,
        /// Server-initiated renewal, unsupported here
        ForceRenew = 9,
        /// Relay-agent query for lease state; classified and discarded
        LeaseQuery = 10,
        /// LEASEQUERY answer: address known, no active lease
        LeaseUnassigned = 11,
        /// LEASEQUERY answer: address outside this server's knowledge
        LeaseUnknown = 12,
        /// LEASEQUERY answer: active lease details
        LeaseActive = 13,
    }
}

impl MessageKind {
    /// The conventional upper-case protocol name, for logs and statistics
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Discover => "DISCOVER",
            MessageKind::Offer => "OFFER",
            MessageKind::Request => "REQUEST",
            MessageKind::Decline => "DECLINE",
            MessageKind::Ack => "ACK",
            MessageKind::Nak => "NAK",
            MessageKind::Release => "RELEASE",
            MessageKind::Inform => "INFORM",
            MessageKind::ForceRenew => "FORCERENEW",
            MessageKind::LeaseQuery => "LEASEQUERY",
            MessageKind::LeaseUnassigned => "LEASEUNASSIGNED",
            MessageKind::LeaseUnknown => "LEASEUNKNOWN",
            MessageKind::LeaseActive => "LEASEACTIVE",
            MessageKind::Unknown(_) => "UNKNOWN",
        }
    }
}

impl ByteStructLen for MessageKind {
    const BYTE_LEN: usize = 1;
}

impl ByteStruct for MessageKind {
    fn read_bytes(bytes: &[u8]) -> Self {
        Self::from(bytes[0])
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0] = u8::from(*self);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_kind_round_trip() {
        for value in 1_u8..=13 {
            let kind = MessageKind::from(value);
            assert_ne!(kind, MessageKind::Unknown(value));
            assert_eq!(u8::from(kind), value);
        }
        assert_eq!(MessageKind::from(40), MessageKind::Unknown(40));
    }

    #[test]
    fn test_operation_round_trip() {
        assert_eq!(DhcpOperation::from(1), DhcpOperation::Request);
        assert_eq!(DhcpOperation::from(2), DhcpOperation::Reply);
        assert_eq!(u8::from(DhcpOperation::Unknown(7)), 7);
    }
}
