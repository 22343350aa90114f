//! The service loop: multiplexed receive, one task per packet, and the
//! once-per-second maintenance tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::{Config, SharedHooks};
use crate::db::Database;
use crate::engine::DhcpEngine;
use crate::link::NetworkLink;
use crate::stats::StatsRegistry;

/// Upper bound on in-flight packet tasks, so an adversarial burst cannot
/// exhaust memory; the abuse layer mitigates but does not replace this
const MAX_IN_FLIGHT: usize = 1024;

/// A running DHCP server: sockets bound, engine wired, ready to loop.
pub struct DhcpService {
    engine: Arc<DhcpEngine>,
    link: Arc<NetworkLink>,
    workers: Arc<Semaphore>,
}

impl DhcpService {
    /// Binds the network and constructs the engine. Socket failures and
    /// configuration errors here are fatal, before any traffic is served.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: &Config,
        database: Arc<dyn Database>,
        hooks: SharedHooks,
        stats: Arc<StatsRegistry>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        info!(
            address = %config.server_ip,
            server_port = config.server_port,
            client_port = config.client_port,
            pxe_port = config.proxy_port,
            response_interface = config.response_interface.as_deref(),
            "preparing to bind"
        );

        let link = Arc::new(NetworkLink::new(config)?);
        hooks.init()?;
        let engine = Arc::new(DhcpEngine::new(
            config.clone(),
            database,
            link.clone(),
            hooks,
            stats,
        ));
        info!("configured DHCP server");

        Ok(DhcpService {
            engine,
            link,
            workers: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        })
    }

    /// The engine, for driving ticks or inspection
    pub fn engine(&self) -> &Arc<DhcpEngine> {
        &self.engine
    }

    /// Serves forever: every received datagram is handled in its own
    /// task, and the abuse-control state decays once per second. No
    /// per-packet error is fatal; the loop re-arms on every iteration.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("DHCP engine beginning normal operation");
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.link.get_data() => match received {
                    Ok((data, source, pxe)) => {
                        match Arc::clone(&self.workers).try_acquire_owned() {
                            Ok(permit) => {
                                let engine = Arc::clone(&self.engine);
                                tokio::spawn(async move {
                                    engine.handle_datagram(data, source, pxe).await;
                                    drop(permit);
                                });
                            }
                            Err(_) => {
                                debug!(%source, "worker limit reached; datagram dropped");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "suppressed non-fatal receive error");
                    }
                },
                _ = tick.tick() => self.engine.tick(),
            }
        }
    }
}
