//! The DHCP engine: classifies received packets, applies policy, resolves
//! definitions, and transforms requests into replies.
//!
//! Each received datagram is handled to completion by one task. Handlers
//! signal failure through [`PacketRejection`]; the dispatcher applies the
//! matching side effect (blacklist, log severity) and guarantees exactly
//! one statistics record per task no matter how handling ends.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::abuse::{AbuseCheck, AbuseMonitor};
use crate::config::{Config, SharedHooks};
use crate::db::{Database, Definition};
use crate::dhcp::options::{encode_ipv4, encode_ipv4s, encode_string, encode_u32};
use crate::dhcp::packet::{DhcpPacket, PxeOptions};
use crate::dhcp::MessageKind;
use crate::link::{Address, ResponseLink};
use crate::stats::{Statistics, StatsRegistry};
use crate::{is_unspecified, MacAddr};

// Logical packet-type labels, as used in logs and statistics
const TYPE_DECLINE: &str = "DECLINE";
const TYPE_DISCOVER: &str = "DISCOVER";
const TYPE_INFORM: &str = "INFORM";
const TYPE_LEASEQUERY: &str = "LEASEQUERY";
const TYPE_RELEASE: &str = "RELEASE";
const TYPE_REQUEST: &str = "REQUEST";
const TYPE_REQUEST_INIT_REBOOT: &str = "REQUEST:INIT-REBOOT";
const TYPE_REQUEST_REBIND: &str = "REQUEST:REBIND";
const TYPE_REQUEST_RENEW: &str = "REQUEST:RENEW";
const TYPE_REQUEST_SELECTING: &str = "REQUEST:SELECTING";
const TYPE_OTHER: &str = "OTHER";

/// Why a handler abandoned a packet. The dispatcher owns the side effects:
/// each variant carries its reason for the log line.
#[derive(Debug, Error)]
pub enum PacketRejection {
    /// The sender is not permitted by policy; logged at warn, no blacklist
    #[error("{reason}")]
    Unacceptable {
        /// Human-readable policy that failed
        reason: String,
    },
    /// The sender is on cooldown; logged at debug
    #[error("{reason}")]
    Ignored {
        /// Why the packet is being ignored
        reason: String,
    },
    /// The sender earned a temporary blacklist from this packet
    #[error("{reason}")]
    Blacklist {
        /// What the sender did
        reason: String,
    },
    /// The reference database failed mid-lookup
    #[error("database failure: {source}")]
    Database {
        /// The underlying failure
        source: anyhow::Error,
    },
    /// An operator extension hook failed
    #[error("extension hook failed: {source}")]
    Hook {
        /// The underlying failure
        source: anyhow::Error,
    },
}

/// Everything a handler needs about the packet in flight, plus the state
/// that must survive until the statistics record is emitted.
struct PacketContext {
    packet: DhcpPacket,
    packet_type: &'static str,
    source: Address,
    pxe: bool,
    start: Instant,
    mac: MacAddr,
    /// Option 50
    requested_ip: Option<Ipv4Addr>,
    /// Option 54
    sid: Option<Ipv4Addr>,
    ciaddr: Option<Ipv4Addr>,
    giaddr: Option<Ipv4Addr>,
    pxe_options: Option<PxeOptions>,
    /// The client IP this request is about, for statistics
    associated_ip: Option<Ipv4Addr>,
    definition: Option<Definition>,
    processed: bool,
}

impl PacketContext {
    fn new(mut packet: DhcpPacket, packet_type: &'static str, source: Address, pxe: bool) -> Self {
        let mac = packet.hardware_address();
        let requested_ip = packet.option_ipv4(50);
        let sid = packet.option_ipv4(54);
        let ciaddr = DhcpPacket::ip_field(packet.header.ciaddr);
        let giaddr = DhcpPacket::ip_field(packet.header.giaddr);
        let pxe_options = pxe.then(|| packet.extract_pxe_options());

        PacketContext {
            packet,
            packet_type,
            source,
            pxe,
            start: Instant::now(),
            mac,
            requested_ip,
            sid,
            ciaddr,
            giaddr,
            pxe_options,
            associated_ip: ciaddr,
            definition: None,
            processed: false,
        }
    }

    /// Logs the occurrence of this packet
    fn announce(&self, ip: Option<Ipv4Addr>) {
        info!(
            packet_type = self.packet_type,
            mac = %self.mac,
            ip = ip.map(|i| i.to_string()),
            source = %self.source,
            pxe = self.pxe,
            "packet received"
        );
    }
}

/// The handler that responds to all received requests.
pub struct DhcpEngine {
    config: Config,
    database: Arc<dyn Database>,
    link: Arc<dyn ResponseLink>,
    hooks: SharedHooks,
    abuse: AbuseMonitor,
    stats: Arc<StatsRegistry>,
}

impl DhcpEngine {
    /// Wires the engine to its collaborators
    pub fn new(
        config: Config,
        database: Arc<dyn Database>,
        link: Arc<dyn ResponseLink>,
        hooks: SharedHooks,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let abuse = AbuseMonitor::new(
            config.enable_suspend,
            config.suspend_threshold,
            config.misbehaving_client_timeout,
            config.unauthorized_client_timeout,
        );
        DhcpEngine {
            config,
            database,
            link,
            hooks,
            abuse,
            stats,
        }
    }

    /// Decays the abuse-control state; drive once per second
    pub fn tick(&self) {
        self.abuse.tick();
    }

    /// The abuse monitor, for observation
    pub fn abuse(&self) -> &AbuseMonitor {
        &self.abuse
    }

    /// Entry point for one received datagram: decode, classify, and run
    /// the matching handler to completion
    pub async fn handle_datagram(&self, data: Vec<u8>, source: Address, pxe: bool) {
        let start = Instant::now();
        let packet = match DhcpPacket::decode(&data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%source, error = %e, "dropping non-DHCP datagram");
                self.emit_other(source, pxe, start);
                return;
            }
        };

        let packet_type = match packet.message_kind() {
            Some(MessageKind::Discover) => TYPE_DISCOVER,
            Some(MessageKind::Request) => TYPE_REQUEST,
            Some(MessageKind::Decline) => TYPE_DECLINE,
            Some(MessageKind::Release) => TYPE_RELEASE,
            Some(MessageKind::Inform) => TYPE_INFORM,
            Some(MessageKind::LeaseQuery) => TYPE_LEASEQUERY,
            other => {
                debug!(%source, kind = ?other, "dropping packet with unhandled message type");
                self.emit_other(source, pxe, start);
                return;
            }
        };

        self.process(packet, packet_type, source, pxe).await;
    }

    /// The shared handler scaffolding: source screening, dispatch, side
    /// effects, and the end-of-task statistics record
    async fn process(&self, packet: DhcpPacket, packet_type: &'static str, source: Address, pxe: bool) {
        let mut ctx = PacketContext::new(packet, packet_type, source, pxe);
        debug!(
            packet_type = ctx.packet_type,
            mac = %ctx.mac,
            source = %ctx.source,
            "evaluating packet"
        );

        match self.screen(&ctx) {
            Ok(()) => {
                let result = match ctx.packet_type {
                    TYPE_DISCOVER => self.handle_discover(&mut ctx).await,
                    TYPE_REQUEST => self.handle_request(&mut ctx).await,
                    TYPE_DECLINE => self.handle_decline(&mut ctx).await,
                    TYPE_RELEASE => self.handle_release(&mut ctx).await,
                    TYPE_INFORM => self.handle_inform(&mut ctx).await,
                    TYPE_LEASEQUERY => self.handle_leasequery(&mut ctx),
                    _ => Ok(()),
                };
                match result {
                    Ok(()) => {}
                    Err(PacketRejection::Blacklist { reason }) => {
                        self.abuse.blacklist(ctx.mac, ctx.packet_type, &reason);
                    }
                    Err(PacketRejection::Database { source }) => {
                        error!(
                            packet_type = ctx.packet_type,
                            mac = %ctx.mac,
                            error = ?source,
                            "database failure while handling packet"
                        );
                    }
                    Err(PacketRejection::Hook { source }) => {
                        error!(
                            packet_type = ctx.packet_type,
                            mac = %ctx.mac,
                            error = ?source,
                            critical = true,
                            "unable to handle packet"
                        );
                    }
                    Err(rejection) => {
                        warn!(
                            packet_type = ctx.packet_type,
                            mac = %ctx.mac,
                            reason = %rejection,
                            "packet dropped"
                        );
                    }
                }
            }
            Err(PacketRejection::Unacceptable { reason }) => {
                warn!(relay = ?ctx.giaddr, reason, "request ignored");
            }
            Err(PacketRejection::Ignored { reason }) => {
                debug!(mac = %ctx.mac, reason, "request ignored");
            }
            Err(rejection) => {
                warn!(mac = %ctx.mac, reason = %rejection, "request ignored");
            }
        }

        if !ctx.processed {
            debug!(packet_type = ctx.packet_type, mac = %ctx.mac, "discarded packet");
        }
        self.emit_statistics(&ctx);
    }

    /// Pre-handler screening: relay/link-local policy, then the per-MAC
    /// cooldown and activity accounting
    fn screen(&self, ctx: &PacketContext) -> Result<(), PacketRejection> {
        if let Some(giaddr) = ctx.giaddr {
            if !self.config.allow_dhcp_relays {
                return Err(PacketRejection::Unacceptable {
                    reason: "relay support not enabled".to_string(),
                });
            }
            if !self.config.allowed_dhcp_relays.is_empty()
                && !self.config.allowed_dhcp_relays.contains(&giaddr)
            {
                return Err(PacketRejection::Unacceptable {
                    reason: "relay not authorised".to_string(),
                });
            }
        } else if !self.config.allow_local_dhcp && !ctx.pxe {
            return Err(PacketRejection::Unacceptable {
                reason: "neither link-local traffic nor PXE is enabled".to_string(),
            });
        }

        match self.abuse.evaluate(ctx.mac) {
            AbuseCheck::Ok => Ok(()),
            AbuseCheck::Cooldown { remaining } => Err(PacketRejection::Ignored {
                reason: format!("MAC is on cooldown for another {} seconds", remaining),
            }),
            AbuseCheck::Suspended => Err(PacketRejection::Ignored {
                reason: "MAC has been ignored for excessive activity".to_string(),
            }),
        }
    }

    /// Runs the operator packet filter; rejection blacklists the sender
    fn filter_packet(
        &self,
        ctx: &mut PacketContext,
        override_ip: Option<Option<Ipv4Addr>>,
    ) -> Result<(), PacketRejection> {
        let ip = match override_ip {
            Some(value) => {
                ctx.associated_ip = value;
                value
            }
            None => ctx.requested_ip,
        };
        let passed = self
            .hooks
            .filter_packet(
                &ctx.packet,
                ctx.packet_type,
                ctx.mac,
                ip,
                ctx.giaddr,
                ctx.pxe_options.as_ref(),
            )
            .map_err(|source| PacketRejection::Hook { source })?;
        if !passed {
            return Err(PacketRejection::Blacklist {
                reason: "filter_packet() rejected the packet".to_string(),
            });
        }
        Ok(())
    }

    /// Queries the database (and the unknown-MAC hook) to match the MAC to
    /// a "lease"
    async fn retrieve_definition(
        &self,
        ctx: &mut PacketContext,
        override_ip: Option<Option<Ipv4Addr>>,
    ) -> Result<Option<Definition>, PacketRejection> {
        let ip = match override_ip {
            Some(value) => {
                ctx.associated_ip = value;
                value
            }
            None => ctx.requested_ip,
        };

        let mut definitions = self
            .database
            .lookup_mac(ctx.mac)
            .await
            .map_err(|source| PacketRejection::Database { source })?;

        let definition = match definitions.len() {
            0 => self
                .hooks
                .handle_unknown_mac(
                    &ctx.packet,
                    ctx.packet_type,
                    ctx.mac,
                    ip,
                    ctx.giaddr,
                    ctx.pxe_options.as_ref(),
                )
                .map_err(|source| PacketRejection::Hook { source })?,
            1 => Some(definitions.remove(0)),
            _ => {
                let chosen = self
                    .hooks
                    .filter_retrieved_definitions(
                        definitions,
                        &ctx.packet,
                        ctx.packet_type,
                        ctx.mac,
                        ip,
                        ctx.giaddr,
                        ctx.pxe_options.as_ref(),
                    )
                    .map_err(|source| PacketRejection::Hook { source })?;
                if chosen.is_none() {
                    warn!(
                        mac = %ctx.mac,
                        "multiple definitions matched and filter_retrieved_definitions() chose none"
                    );
                }
                chosen
            }
        };

        ctx.definition = definition.clone();
        Ok(definition)
    }

    /// Sets option fields from the definition, then passes the packet
    /// through operator scripting; false means "do not send"
    fn load_dhcp_packet(
        &self,
        ctx: &mut PacketContext,
        definition: &Definition,
        inform: bool,
    ) -> Result<bool, PacketRejection> {
        // Core parameters
        if !inform {
            ctx.packet.header.yiaddr = definition.ip.into();
            set_option_checked(&mut ctx.packet, 51, encode_u32(definition.lease_time));
        }

        // Default gateway, subnet mask, and broadcast address
        if !definition.gateways.is_empty() {
            set_option_checked(&mut ctx.packet, 3, encode_ipv4s(&definition.gateways));
        }
        if let Some(subnet_mask) = definition.subnet_mask {
            set_option_checked(&mut ctx.packet, 1, encode_ipv4(subnet_mask));
        }
        if let Some(broadcast_address) = definition.broadcast_address {
            set_option_checked(&mut ctx.packet, 28, encode_ipv4(broadcast_address));
        }

        // Domain details
        if let Some(hostname) = &definition.hostname {
            set_option_checked(&mut ctx.packet, 12, encode_string(hostname));
        }
        if let Some(domain_name) = &definition.domain_name {
            set_option_checked(&mut ctx.packet, 15, encode_string(domain_name));
        }
        if !definition.domain_name_servers.is_empty() {
            set_option_checked(
                &mut ctx.packet,
                6,
                encode_ipv4s(&definition.domain_name_servers),
            );
        }

        // NTP servers
        if !definition.ntp_servers.is_empty() {
            set_option_checked(&mut ctx.packet, 42, encode_ipv4s(&definition.ntp_servers));
        }

        let proceed = self
            .hooks
            .load_dhcp_packet(
                &mut ctx.packet,
                ctx.packet_type,
                ctx.mac,
                definition,
                ctx.giaddr,
                ctx.pxe_options.as_ref(),
            )
            .map_err(|source| PacketRejection::Hook { source })?;
        if !proceed {
            info!(
                packet_type = ctx.packet_type,
                mac = %ctx.mac,
                "ignoring packet per load_dhcp_packet()"
            );
        }
        Ok(proceed)
    }

    /// Sends the reply back toward where the request came from
    async fn emit_to_source(&self, ctx: &mut PacketContext) {
        let source = ctx.source;
        self.emit_packet(ctx, source).await;
    }

    /// Stamps the server identifier and sends the reply to `address`,
    /// marking the packet processed on success
    async fn emit_packet(&self, ctx: &mut PacketContext, address: Address) {
        set_option_checked(&mut ctx.packet, 54, encode_ipv4(self.config.server_ip));

        match self.link.send_response(&mut ctx.packet, address, ctx.pxe).await {
            Ok((bytes, used)) => {
                let response_type = ctx
                    .packet
                    .message_kind()
                    .map(|k| k.name())
                    .unwrap_or("UNKNOWN");
                info!(
                    response_type,
                    mac = %ctx.mac,
                    client = ctx.associated_ip.map(|ip| ip.to_string()),
                    via = %used,
                    pxe = ctx.pxe,
                    bytes,
                    "response sent"
                );
                ctx.processed = true;
            }
            Err(e) => {
                error!(
                    mac = %ctx.mac,
                    error = %e,
                    "transmission failed; response abandoned"
                );
            }
        }
    }

    /// Evaluates a DISCOVER and determines whether an OFFER (or, with
    /// rapid commit, an immediate ACK) should be sent
    async fn handle_discover(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        self.filter_packet(ctx, Some(None))?;
        ctx.announce(None);

        let definition = self.retrieve_definition(ctx, Some(None)).await?;
        match definition {
            Some(definition) => {
                let rapid_commit = ctx.packet.is_option(80) && self.config.enable_rapidcommit;
                if rapid_commit {
                    info!(mac = %ctx.mac, "DISCOVER requested rapid-commit");
                    ctx.packet.transform_to_ack();
                    set_option_checked(&mut ctx.packet, 80, Vec::new());
                } else {
                    ctx.packet.transform_to_offer();
                }
                ctx.associated_ip = Some(definition.ip);
                if self.load_dhcp_packet(ctx, &definition, false)? {
                    self.emit_to_source(ctx).await;
                }
                Ok(())
            }
            None => {
                if self.config.authoritative {
                    ctx.packet.transform_to_nak();
                    ctx.associated_ip = None;
                    self.emit_to_source(ctx).await;
                    Ok(())
                } else {
                    Err(PacketRejection::Blacklist {
                        reason:
                            "unknown MAC and server is not authoritative; ignoring because rejection is impossible"
                                .to_string(),
                    })
                }
            }
        }
    }

    /// Splits a REQUEST into its four sub-modes; the split is a total
    /// function of (sid, ciaddr, requested-ip, source-was-broadcast)
    async fn handle_request(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        if ctx.sid.is_some() && ctx.ciaddr.is_none() {
            self.handle_request_selecting(ctx).await
        } else if ctx.sid.is_none() && ctx.ciaddr.is_none() && ctx.requested_ip.is_some() {
            self.handle_request_init_reboot(ctx).await
        } else if ctx.sid.is_none() && ctx.ciaddr.is_some() && ctx.requested_ip.is_none() {
            self.handle_request_renew_rebind(ctx).await
        } else {
            warn!(
                sid = ?ctx.sid,
                ciaddr = ?ctx.ciaddr,
                ip = ?ctx.requested_ip,
                mac = %ctx.mac,
                "REQUEST unhandled: packet not compliant with DHCP spec"
            );
            Ok(())
        }
    }

    async fn handle_request_selecting(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        ctx.packet_type = TYPE_REQUEST_SELECTING;
        if ctx.sid != Some(self.config.server_ip) {
            // Another server was chosen; nothing to say
            return Ok(());
        }
        self.filter_packet(ctx, None)?;
        ctx.announce(ctx.requested_ip);

        let definition = self.retrieve_definition(ctx, None).await?;
        match definition {
            Some(definition)
                if ctx.requested_ip.is_none() || ctx.requested_ip == Some(definition.ip) =>
            {
                ctx.packet.transform_to_ack();
                if self.load_dhcp_packet(ctx, &definition, false)? {
                    self.emit_to_source(ctx).await;
                }
            }
            _ => {
                ctx.packet.transform_to_nak();
                self.emit_to_source(ctx).await;
            }
        }
        Ok(())
    }

    async fn handle_request_init_reboot(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        ctx.packet_type = TYPE_REQUEST_INIT_REBOOT;
        self.filter_packet(ctx, None)?;
        ctx.announce(ctx.requested_ip);

        let definition = self.retrieve_definition(ctx, None).await?;
        match definition {
            Some(definition) if Some(definition.ip) == ctx.requested_ip => {
                ctx.packet.transform_to_ack();
                if self.load_dhcp_packet(ctx, &definition, false)? {
                    self.emit_to_source(ctx).await;
                }
            }
            _ => {
                ctx.packet.transform_to_nak();
                self.emit_to_source(ctx).await;
            }
        }
        Ok(())
    }

    async fn handle_request_renew_rebind(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        // Relayed requests are judged by the client's own address field;
        // everything else by the transport source
        let broadcast_source = if ctx.giaddr.is_some() {
            ctx.ciaddr.map(is_unspecified).unwrap_or(true)
        } else {
            is_unspecified(ctx.source.ip)
        };
        let renew = !broadcast_source;
        ctx.packet_type = if renew {
            TYPE_REQUEST_RENEW
        } else {
            TYPE_REQUEST_REBIND
        };
        self.filter_packet(ctx, None)?;
        ctx.announce(ctx.ciaddr);

        if self.config.nak_renewals && !ctx.pxe && (renew || self.config.authoritative) {
            ctx.packet.transform_to_nak();
            ctx.associated_ip = None;
            self.emit_to_source(ctx).await;
            return Ok(());
        }

        let definition = self.retrieve_definition(ctx, None).await?;
        let ciaddr = ctx.ciaddr;
        match definition {
            Some(definition) if Some(definition.ip) == ciaddr => {
                ctx.packet.transform_to_ack();
                if let Some(ciaddr) = ciaddr {
                    ctx.packet.header.yiaddr = ciaddr.into();
                }
                if self.load_dhcp_packet(ctx, &definition, false)? {
                    // Renewals go straight back to the client's address
                    let target = Address {
                        ip: ciaddr.unwrap_or(ctx.source.ip),
                        port: 0,
                    };
                    self.emit_packet(ctx, target).await;
                }
            }
            _ if renew => {
                ctx.packet.transform_to_nak();
                let target = Address {
                    ip: ciaddr.unwrap_or(ctx.source.ip),
                    port: 0,
                };
                self.emit_packet(ctx, target).await;
            }
            // A REBIND for an unknown MAC is left for the real owner to answer
            _ => {}
        }
        Ok(())
    }

    /// Evaluates an INFORM: configuration only, never an address
    async fn handle_inform(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        let ciaddr = ctx.ciaddr;
        self.filter_packet(ctx, Some(ciaddr))?;
        ctx.announce(ciaddr);

        if ciaddr.is_none() {
            return Err(PacketRejection::Blacklist {
                reason: "ciaddr was not specified".to_string(),
            });
        }

        let definition = self.retrieve_definition(ctx, Some(ciaddr)).await?;
        match definition {
            Some(definition) => {
                ctx.packet.transform_to_ack();
                if self.load_dhcp_packet(ctx, &definition, true)? {
                    self.emit_to_source(ctx).await;
                }
                Ok(())
            }
            None => Err(PacketRejection::Blacklist {
                reason: "unknown MAC".to_string(),
            }),
        }
    }

    /// Notes a potential IP collision on the network; no reply is sent
    async fn handle_decline(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        if ctx.requested_ip.is_none() {
            return Err(PacketRejection::Blacklist {
                reason: "conflicting IP was not specified".to_string(),
            });
        }
        if ctx.sid.is_none() {
            return Err(PacketRejection::Blacklist {
                reason: "server-identifier was not specified".to_string(),
            });
        }

        if ctx.sid == Some(self.config.server_ip) {
            self.filter_packet(ctx, None)?;
            let definition = self.retrieve_definition(ctx, None).await?;
            match definition {
                Some(definition) if Some(definition.ip) == ctx.requested_ip => {
                    error!(
                        packet_type = ctx.packet_type,
                        mac = %ctx.mac,
                        ip = ?ctx.requested_ip,
                        subnet = %definition.subnet,
                        serial = definition.serial,
                        "client declined its assigned IP: possible address conflict"
                    );
                    ctx.processed = true;
                }
                Some(definition) => {
                    warn!(
                        packet_type = ctx.packet_type,
                        mac = %ctx.mac,
                        ip = ?ctx.requested_ip,
                        assigned = %definition.ip,
                        "DECLINE for an IP that is not the client's assignment"
                    );
                }
                None => {
                    warn!(
                        packet_type = ctx.packet_type,
                        mac = %ctx.mac,
                        ip = ?ctx.requested_ip,
                        "DECLINE from an unknown MAC"
                    );
                }
            }
        }
        Ok(())
    }

    /// Notes a client relinquishing its address; no reply is sent
    async fn handle_release(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        if ctx.sid.is_none() {
            return Err(PacketRejection::Blacklist {
                reason: "server-identifier was not specified".to_string(),
            });
        }

        if ctx.sid == Some(self.config.server_ip) {
            let ciaddr = ctx.ciaddr;
            self.filter_packet(ctx, Some(ciaddr))?;
            let definition = self.retrieve_definition(ctx, Some(ciaddr)).await?;
            match definition {
                Some(definition) if Some(definition.ip) == ciaddr => {
                    ctx.announce(ciaddr);
                    ctx.processed = true;
                }
                _ => {
                    warn!(
                        packet_type = ctx.packet_type,
                        mac = %ctx.mac,
                        ip = ?ciaddr,
                        "RELEASE for an IP with no known assignment"
                    );
                }
            }
        }
        Ok(())
    }

    /// LEASEQUERY support was dropped because the implementation was
    /// wrong; the packet is classified and discarded
    fn handle_leasequery(&self, ctx: &mut PacketContext) -> Result<(), PacketRejection> {
        self.filter_packet(ctx, None)?;
        ctx.announce(None);
        Ok(())
    }

    /// The record for a datagram that never decoded into a handled type
    fn emit_other(&self, source: Address, pxe: bool, start: Instant) {
        self.stats.emit(&Statistics {
            source_address: source,
            mac: None,
            ip: None,
            subnet: None,
            packet_type: TYPE_OTHER.to_string(),
            processing_time: start.elapsed().as_secs_f64(),
            processed: false,
            pxe,
        });
    }

    /// Exactly one record per task, whatever happened
    fn emit_statistics(&self, ctx: &PacketContext) {
        let time_taken = ctx.start.elapsed().as_secs_f64();
        debug!(
            packet_type = ctx.packet_type,
            mac = %ctx.mac,
            seconds = time_taken,
            "request processed"
        );

        let (ip, subnet) = match &ctx.definition {
            Some(definition) => (Some(definition.ip), Some(definition.subnet_id())),
            None => (ctx.associated_ip, None),
        };
        self.stats.emit(&Statistics {
            source_address: ctx.source,
            mac: Some(ctx.mac),
            ip,
            subnet,
            packet_type: ctx.packet_type.to_string(),
            processing_time: time_taken,
            processed: ctx.processed,
            pxe: ctx.pxe,
        });
    }
}

/// Sets an option whose value is known-valid; a failure here is a codec
/// table bug, logged rather than propagated
fn set_option_checked(packet: &mut DhcpPacket, code: u8, value: Vec<u8>) {
    if let Err(e) = packet.set_option(code, value) {
        debug!(code, error = %e, "option skipped");
    }
}
