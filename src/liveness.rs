use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::control_server::Controller;
use crate::protocol::{request, Cipher, ControlMessage};
use crate::{Error, Result, RouterName};

/// Probes one router. Anything but a timely `ProbeAck` counts as no response.
pub async fn probe(router: &str, addr: SocketAddr, cipher: &dyn Cipher, limit: Duration) -> Result<()> {
    match request(addr, cipher, &ControlMessage::Probe, limit).await {
        Ok(ControlMessage::ProbeAck) => Ok(()),
        Ok(other) => {
            debug!("{} answered the probe with {}", router, other.kind());
            Err(Error::LivenessTimeout(router.to_string()))
        }
        Err(e) => {
            debug!("Probe to {} at {} failed: {}", router, addr, e);
            Err(Error::LivenessTimeout(router.to_string()))
        }
    }
}

pub async fn check_routers(controller: &Controller) -> Vec<RouterName> {
    let targets = controller.targets().await;
    let limit = controller.config().probe_timeout;

    let probes = targets
        .iter()
        .map(|(name, addr)| probe(name, *addr, controller.cipher(), limit));
    let results = join_all(probes).await;

    let failed: Vec<RouterName> = targets
        .into_iter()
        .zip(results)
        .filter_map(|((name, _), result)| match result {
            Ok(()) => None,
            Err(e) => {
                warn!("{}", e);
                Some(name)
            }
        })
        .collect();

    if !failed.is_empty() {
        controller.remove_failed(&failed).await;
    }

    failed
}

// first cycle runs one interval after completion, then forever
pub async fn run(controller: Arc<Controller>) {
    let period = controller.config().probe_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let failed = check_routers(&controller).await;
        info!("Liveness check completed, {} router(s) down", failed.len());
    }
}
