//! Network I/O: listening sockets, responder selection, and the three
//! send paths (L3 unicast, L3 broadcast, raw L2 Ethernet).
//!
//! The raw responder exists for clients that do not yet hold an address
//! and did not set the broadcast bit: they can only be reached by frame
//! injection. Two raw transports are tried in order, a native packet
//! socket and then a libpcap injector; when neither is available the link
//! degrades to L3 broadcast.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dhcp::packet::{DhcpPacket, FLAGBIT_BROADCAST};
use crate::dhcp::DHCP_PROXY_PORT;
use crate::enet::{assemble_frame, VlanTag};
use crate::{is_unspecified, MacAddr};

/// An inet layer-3 address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address {
    /// An IPv4 address
    pub ip: Ipv4Addr,
    /// A numeric port value
    pub port: u16,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The send seam the engine talks through, so protocol logic can be
/// exercised against a recording link in tests.
#[async_trait]
pub trait ResponseLink: Send + Sync {
    /// Writes the packet to the appropriate socket, addressed to the
    /// appropriate recipient; returns the bytes written and the address
    /// ultimately used
    async fn send_response(
        &self,
        packet: &mut DhcpPacket,
        address: Address,
        pxe: bool,
    ) -> io::Result<(usize, Address)>;
}

/// Which send path a response takes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Responder {
    /// The server-port socket, unicast
    Dhcp,
    /// The PXE-port socket, unicast with PXE port rules
    Pxe,
    /// The broadcast responder: L3 broadcast or raw L2
    Broadcast,
}

/// A fully resolved send decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Route {
    responder: Responder,
    ip: Ipv4Addr,
    port: u16,
    source_port: u16,
    relayed: bool,
}

/// Resolves where and how a reply is sent, as a pure function of the
/// packet, its source, and the link's capabilities
fn select_route(
    packet: &DhcpPacket,
    address: Address,
    pxe: bool,
    server_port: u16,
    client_port: u16,
    pxe_port: Option<u16>,
    unicast_discover_supported: bool,
) -> Route {
    let mut route = Route {
        responder: Responder::Dhcp,
        ip: address.ip,
        port: client_port,
        source_port: server_port,
        relayed: false,
    };

    if is_unspecified(address.ip) {
        // Broadcast source; this is never valid for PXE
        route.responder = Responder::Broadcast;
        if !unicast_discover_supported || packet.get_flag(FLAGBIT_BROADCAST) {
            route.ip = Ipv4Addr::BROADCAST;
        } else {
            // The client wants unicast and this host can handle it
            route.ip = DhcpPacket::ip_field(packet.header.yiaddr).unwrap_or(Ipv4Addr::BROADCAST);
        }
    } else {
        route.relayed = DhcpPacket::ip_field(packet.header.giaddr).is_some();
        if route.relayed {
            route.port = server_port;
        } else if pxe {
            route.ip = DhcpPacket::ip_field(packet.header.ciaddr).unwrap_or(address.ip);
            // BSD does not reliably preserve source-port information
            route.port = if address.port != 0 {
                address.port
            } else {
                pxe_port.unwrap_or(DHCP_PROXY_PORT)
            };
            route.source_port = pxe_port.unwrap_or(DHCP_PROXY_PORT);
            route.responder = Responder::Pxe;
        }
    }
    route
}

/// Handles network I/O for the server: the listening sockets and every
/// response path.
pub struct NetworkLink {
    server_port: u16,
    client_port: u16,
    pxe_port: Option<u16>,
    dhcp_socket: Arc<UdpSocket>,
    pxe_socket: Option<Arc<UdpSocket>>,
    broadcast: BroadcastResponder,
}

enum BroadcastResponder {
    L3(UdpSocket),
    L2(L2Responder),
}

impl NetworkLink {
    /// Binds the listening sockets and initialises the responders.
    ///
    /// Socket bind failures are fatal; raw-responder failures degrade to
    /// L3 broadcast with a warning.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let listen_interface = interface_for_ip(config.server_ip);
        if let Some(interface) = &listen_interface {
            debug!(interface, "constraining listening sockets to the server interface");
        }

        let dhcp_socket = Arc::new(UdpSocket::from_std(setup_listening_socket(
            config.server_port,
            listen_interface.as_deref(),
        )?)?);
        let pxe_socket = match config.proxy_port {
            Some(port) => Some(Arc::new(UdpSocket::from_std(setup_listening_socket(
                port,
                listen_interface.as_deref(),
            )?)?)),
            None => None,
        };

        let broadcast = match &config.response_interface {
            Some(interface) => {
                let qtags: Vec<VlanTag> = config
                    .response_interface_qtags
                    .iter()
                    .map(|q| VlanTag::new().with_pcp(q.pcp).with_dei(q.dei).with_vid(q.vid))
                    .collect();
                match L2Responder::open(interface, config.server_ip, qtags) {
                    Ok(responder) => {
                        info!(interface, "raw Ethernet responder initialised");
                        BroadcastResponder::L2(responder)
                    }
                    Err(e) => {
                        warn!(
                            interface,
                            error = %e,
                            "raw response-socket requested, but neither a packet socket nor libpcap is available; falling back to L3 broadcast"
                        );
                        BroadcastResponder::L3(broadcast_socket(config.server_ip)?)
                    }
                }
            }
            None => BroadcastResponder::L3(broadcast_socket(config.server_ip)?),
        };

        Ok(NetworkLink {
            server_port: config.server_port,
            client_port: config.client_port,
            pxe_port: config.proxy_port,
            dhcp_socket,
            pxe_socket,
            broadcast,
        })
    }

    /// Whether DISCOVER responses can be unicast to clients without an
    /// address (requires the raw responder)
    fn unicast_discover_supported(&self) -> bool {
        matches!(self.broadcast, BroadcastResponder::L2(_))
    }

    /// Waits for a datagram on either listening socket. Returns the
    /// payload, its source, and whether it arrived on the PXE port.
    pub async fn get_data(&self) -> io::Result<(Vec<u8>, Address, bool)> {
        async fn recv(socket: &UdpSocket) -> io::Result<(Vec<u8>, SocketAddr)> {
            let mut buffer = vec![0_u8; 2048];
            let (length, source) = socket.recv_from(&mut buffer).await?;
            buffer.truncate(length);
            Ok((buffer, source))
        }

        let (data, source, pxe) = match &self.pxe_socket {
            Some(pxe_socket) => tokio::select! {
                received = recv(&self.dhcp_socket) => {
                    let (data, source) = received?;
                    (data, source, false)
                }
                received = recv(pxe_socket) => {
                    let (data, source) = received?;
                    (data, source, true)
                }
            },
            None => {
                let (data, source) = recv(&self.dhcp_socket).await?;
                (data, source, false)
            }
        };

        let address = match source {
            SocketAddr::V4(v4) => Address {
                ip: *v4.ip(),
                port: v4.port(),
            },
            SocketAddr::V6(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "IPv6 source on an IPv4 socket",
                ))
            }
        };
        Ok((data, address, pxe))
    }

    /// Performs final address manipulation shared by every responder, then
    /// transmits: the broadcast bit is forced to reflect whether the
    /// request was broadcast-sourced (and restored afterwards), and the
    /// packet-level override fields take effect here.
    async fn transmit(
        &self,
        packet: &mut DhcpPacket,
        route: Route,
        source_ip: Ipv4Addr,
    ) -> io::Result<(usize, Address)> {
        // Relayed requests are judged by the client's own address field;
        // everything else by the transport source
        let broadcast_source = if route.relayed {
            DhcpPacket::ip_field(packet.header.ciaddr)
                .map(is_unspecified)
                .unwrap_or(true)
        } else {
            is_unspecified(source_ip)
        };
        let (broadcast_changed, original_was_broadcast) =
            packet.set_flag(FLAGBIT_BROADCAST, broadcast_source);

        let mut ip = route.ip;
        if !original_was_broadcast {
            // Unicast behaviour permitted; use the packet's IP override, if set
            ip = packet.response_ip.unwrap_or(ip);
        }
        let port = packet.response_port.unwrap_or(route.port);
        let source_port = packet.response_source_port.unwrap_or(route.source_port);

        let payload = packet.encode();
        let destination = SocketAddrV4::new(ip, port);
        let sent = match route.responder {
            Responder::Dhcp => self.dhcp_socket.send_to(&payload, destination).await?,
            Responder::Pxe => match &self.pxe_socket {
                Some(socket) => socket.send_to(&payload, destination).await?,
                None => self.dhcp_socket.send_to(&payload, destination).await?,
            },
            Responder::Broadcast => match &self.broadcast {
                BroadcastResponder::L3(socket) => socket.send_to(&payload, destination).await?,
                BroadcastResponder::L2(responder) => {
                    let dst_mac = if ip == Ipv4Addr::BROADCAST {
                        MacAddr::BROADCAST
                    } else {
                        packet.response_mac.unwrap_or_else(|| packet.hardware_address())
                    };
                    responder.send(&payload, dst_mac, ip, port, source_port)?
                }
            },
        };

        if broadcast_changed {
            // Restore the bit in case the packet is used for something else
            packet.set_flag(FLAGBIT_BROADCAST, original_was_broadcast);
        }
        Ok((sent, Address { ip, port }))
    }
}

#[async_trait]
impl ResponseLink for NetworkLink {
    async fn send_response(
        &self,
        packet: &mut DhcpPacket,
        address: Address,
        pxe: bool,
    ) -> io::Result<(usize, Address)> {
        let route = select_route(
            packet,
            address,
            pxe,
            self.server_port,
            self.client_port,
            self.pxe_port,
            self.unicast_discover_supported(),
        );
        self.transmit(packet, route, address.ip).await
    }
}

/// Creates and binds one listening socket: reuse-addr always, reuse-port
/// off Linux, optionally constrained to a single interface
fn setup_listening_socket(port: u16, interface: Option<&str>) -> anyhow::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(e) = socket.set_reuse_address(true) {
        warn!(error = %e, "unable to set SO_REUSEADDR; parallel servers will conflict");
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!(error = %e, "unable to set SO_REUSEPORT; parallel servers will conflict");
    }
    #[cfg(target_os = "linux")]
    if let Some(interface) = interface {
        socket
            .bind_device(Some(interface.as_bytes()))
            .map_err(|e| anyhow::anyhow!("unable to listen only on {}: {}", interface, e))?;
    }
    #[cfg(not(target_os = "linux"))]
    let _ = interface;
    socket.set_nonblocking(true)?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .map_err(|e| anyhow::anyhow!("unable to bind port {}: {}", port, e))?;
    Ok(socket.into())
}

/// An arbitrarily bound socket with broadcast capabilities, for the L3
/// broadcast responder
fn broadcast_socket(server_ip: Ipv4Addr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&SocketAddrV4::new(server_ip, 0).into())
        .map_err(|e| anyhow::anyhow!("unable to bind broadcast socket: {}", e))?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// The name of the interface owning `ip`, resolved through getifaddrs
pub fn interface_for_ip(ip: Ipv4Addr) -> Option<String> {
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs allocates the list we walk and free below; every
    // pointer dereferenced is checked for null first
    unsafe {
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return None;
        }
        let mut result = None;
        let mut cursor = ifaddrs;
        while !cursor.is_null() {
            let entry = &*cursor;
            if !entry.ifa_addr.is_null()
                && (*entry.ifa_addr).sa_family == libc::AF_INET as libc::sa_family_t
            {
                let sin = &*(entry.ifa_addr as *const libc::sockaddr_in);
                let addr = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                if addr == ip {
                    result = Some(
                        std::ffi::CStr::from_ptr(entry.ifa_name)
                            .to_string_lossy()
                            .into_owned(),
                    );
                    break;
                }
            }
            cursor = entry.ifa_next;
        }
        libc::freeifaddrs(ifaddrs);
        result
    }
}

/// Ethernet payload type for the raw socket bind; nothing should be
/// addressable to it, so grab a protocol no one speaks
#[cfg(target_os = "linux")]
const ETH_P_SNAP: u16 = 0x0005;

/// Responds at layer 2, assembling complete Ethernet frames.
///
/// The underlying transport is serialised behind a mutex: neither raw
/// sends nor pcap injection are guaranteed thread-safe.
struct L2Responder {
    transport: Mutex<RawTransport>,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    qtags: Vec<VlanTag>,
}

enum RawTransport {
    #[cfg(target_os = "linux")]
    AfPacket(AfPacketSocket),
    #[cfg(feature = "l2-pcap")]
    Pcap(pcap::Capture<pcap::Active>),
}

impl L2Responder {
    /// Tries the native packet socket first, then the libpcap injector
    #[allow(unreachable_code, unused_variables)]
    fn open(interface: &str, src_ip: Ipv4Addr, qtags: Vec<VlanTag>) -> anyhow::Result<Self> {
        #[cfg(target_os = "linux")]
        match AfPacketSocket::open(interface) {
            Ok((socket, src_mac)) => {
                return Ok(L2Responder {
                    transport: Mutex::new(RawTransport::AfPacket(socket)),
                    src_mac,
                    src_ip,
                    qtags,
                });
            }
            Err(e) => {
                debug!(interface, error = %e, "packet socket unavailable");
            }
        }

        #[cfg(feature = "l2-pcap")]
        {
            let src_mac = interface_mac(interface)?;
            let capture = pcap::Capture::from_device(interface)?.open()?;
            return Ok(L2Responder {
                transport: Mutex::new(RawTransport::Pcap(capture)),
                src_mac,
                src_ip,
                qtags,
            });
        }

        Err(anyhow::anyhow!(
            "no raw transport available on {}",
            interface
        ))
    }

    /// Assembles and injects one frame
    fn send(
        &self,
        payload: &[u8],
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
    ) -> io::Result<usize> {
        let frame = assemble_frame(
            payload,
            dst_mac,
            self.src_mac,
            dst_ip.into(),
            self.src_ip.into(),
            dst_port,
            src_port,
            &self.qtags,
        );
        let mut transport = self.transport.lock().expect("raw transport lock poisoned");
        match &mut *transport {
            #[cfg(target_os = "linux")]
            RawTransport::AfPacket(socket) => socket.send(&frame),
            #[cfg(feature = "l2-pcap")]
            RawTransport::Pcap(capture) => {
                capture
                    .sendpacket(frame.as_slice())
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(frame.len())
            }
        }
    }
}

/// A Linux AF_PACKET raw socket bound to one interface
#[cfg(target_os = "linux")]
struct AfPacketSocket {
    fd: std::os::fd::RawFd,
}

#[cfg(target_os = "linux")]
impl AfPacketSocket {
    /// Opens the socket and reports the interface's MAC address
    fn open(interface: &str) -> io::Result<(Self, MacAddr)> {
        let name = std::ffi::CString::new(interface)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad interface name"))?;
        // SAFETY: plain syscalls on an owned fd; sockaddr_ll is zeroed
        // before use and sized explicitly
        unsafe {
            let fd = libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                ETH_P_SNAP.to_be() as libc::c_int,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            let socket = AfPacketSocket { fd };

            let ifindex = libc::if_nametoindex(name.as_ptr());
            if ifindex == 0 {
                return Err(io::Error::last_os_error());
            }

            let mut sll: libc::sockaddr_ll = std::mem::zeroed();
            sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
            sll.sll_protocol = ETH_P_SNAP.to_be();
            sll.sll_ifindex = ifindex as libc::c_int;
            if libc::bind(
                fd,
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            ) != 0
            {
                return Err(io::Error::last_os_error());
            }

            // Keep kernel buffering minimal; nothing is ever received here
            let size: libc::c_int = 4096;
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_SNDBUF,
                &size as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &size as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );

            let mut bound: libc::sockaddr_ll = std::mem::zeroed();
            let mut length = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            if libc::getsockname(
                fd,
                &mut bound as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                &mut length,
            ) != 0
            {
                return Err(io::Error::last_os_error());
            }
            let mut mac = [0_u8; 6];
            mac.copy_from_slice(&bound.sll_addr[..6]);

            Ok((socket, MacAddr::new(mac)))
        }
    }

    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        // SAFETY: fd is owned and open; the buffer outlives the call
        let sent = unsafe {
            libc::send(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }
}

#[cfg(target_os = "linux")]
impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        // SAFETY: the fd is owned by this struct and closed exactly once
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// The MAC address of a named interface, via SIOCGIFHWADDR
#[cfg(all(target_os = "linux", feature = "l2-pcap"))]
fn interface_mac(interface: &str) -> io::Result<MacAddr> {
    interface_mac_linux(interface)
}

/// Raw transports need a source MAC; without the Linux ioctl there is no
/// portable way to learn one
#[cfg(all(not(target_os = "linux"), feature = "l2-pcap"))]
fn interface_mac(_interface: &str) -> io::Result<MacAddr> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface MAC discovery is only implemented on Linux",
    ))
}

#[cfg(all(target_os = "linux", feature = "l2-pcap"))]
fn interface_mac_linux(interface: &str) -> io::Result<MacAddr> {
    let name = std::ffi::CString::new(interface)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad interface name"))?;
    // SAFETY: the ifreq is zeroed, the name bounded, and the fd closed on
    // every path
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut request: libc::ifreq = std::mem::zeroed();
        for (i, byte) in name.as_bytes().iter().take(libc::IFNAMSIZ - 1).enumerate() {
            request.ifr_name[i] = *byte as libc::c_char;
        }
        let result = libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut request);
        libc::close(fd);
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut mac = [0_u8; 6];
        for (i, byte) in request.ifr_ifru.ifru_hwaddr.sa_data[..6].iter().enumerate() {
            mac[i] = *byte as u8;
        }
        Ok(MacAddr::new(mac))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ByteArray;

    fn packet() -> DhcpPacket {
        let mut packet = DhcpPacket::new();
        packet.set_hardware_address(MacAddr::new([2, 0, 0, 0, 0, 1]));
        packet
    }

    fn source(ip: [u8; 4], port: u16) -> Address {
        Address {
            ip: Ipv4Addr::from(ip),
            port,
        }
    }

    #[test]
    fn test_relayed_request_unicasts_to_giaddr_on_server_port() {
        let mut p = packet();
        p.header.giaddr = ByteArray([10, 0, 0, 254]);
        let route = select_route(&p, source([10, 0, 0, 254], 67), false, 67, 68, None, false);
        assert_eq!(route.responder, Responder::Dhcp);
        assert!(route.relayed);
        assert_eq!(route.ip, Ipv4Addr::new(10, 0, 0, 254));
        assert_eq!(route.port, 67);
    }

    #[test]
    fn test_unicast_source_goes_back_on_client_port() {
        let p = packet();
        let route = select_route(&p, source([10, 0, 0, 5], 68), false, 67, 68, None, false);
        assert_eq!(route.responder, Responder::Dhcp);
        assert!(!route.relayed);
        assert_eq!(route.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(route.port, 68);
        assert_eq!(route.source_port, 67);
    }

    #[test]
    fn test_pxe_unicast_prefers_ciaddr_and_source_port() {
        let mut p = packet();
        p.header.ciaddr = ByteArray([10, 0, 0, 7]);
        let route = select_route(&p, source([10, 0, 0, 5], 4012), true, 67, 68, Some(4011), false);
        assert_eq!(route.responder, Responder::Pxe);
        assert_eq!(route.ip, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(route.port, 4012);
        assert_eq!(route.source_port, 4011);

        // Port information lost in transit falls back to the PXE port
        let route = select_route(&p, source([10, 0, 0, 5], 0), true, 67, 68, Some(4011), false);
        assert_eq!(route.port, 4011);
    }

    #[test]
    fn test_broadcast_source_with_broadcast_bit() {
        let mut p = packet();
        p.set_flag(FLAGBIT_BROADCAST, true);
        p.header.yiaddr = ByteArray([10, 0, 0, 9]);
        // Even with raw support, the broadcast bit wins
        let route = select_route(&p, source([0, 0, 0, 0], 68), false, 67, 68, None, true);
        assert_eq!(route.responder, Responder::Broadcast);
        assert_eq!(route.ip, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_broadcast_source_without_bit_unicasts_to_yiaddr_when_raw() {
        let mut p = packet();
        p.header.yiaddr = ByteArray([10, 0, 0, 9]);
        let route = select_route(&p, source([0, 0, 0, 0], 68), false, 67, 68, None, true);
        assert_eq!(route.responder, Responder::Broadcast);
        assert_eq!(route.ip, Ipv4Addr::new(10, 0, 0, 9));

        // Without raw support everything goes to the limited broadcast
        let route = select_route(&p, source([0, 0, 0, 0], 68), false, 67, 68, None, false);
        assert_eq!(route.ip, Ipv4Addr::BROADCAST);

        // No yiaddr to aim at either
        let mut p = packet();
        p.header.yiaddr = ByteArray([0, 0, 0, 0]);
        let route = select_route(&p, source([0, 0, 0, 0], 68), false, 67, 68, None, true);
        assert_eq!(route.ip, Ipv4Addr::BROADCAST);
    }
}
