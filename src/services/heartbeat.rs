//! Heartbeat reaper background task.
//!
//! Connections that have sent nothing for longer than the heartbeat
//! timeout are closed; their connection task then releases room
//! membership. In-flight ledger operations are unaffected because they run
//! on their own tasks.

use crate::config::HeartbeatConfig;
use crate::state::Hub;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the reaper. It stops when the hub shuts down.
pub fn spawn_heartbeat_reaper(hub: Arc<Hub>, config: &HeartbeatConfig) -> JoinHandle<()> {
    spawn_with(hub, config.timeout(), config.check_interval())
}

/// Reaper with explicit timings.
pub fn spawn_with(hub: Arc<Hub>, timeout: Duration, check_interval: Duration) -> JoinHandle<()> {
    let shutdown = hub.shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let reaped = hub.reap_idle(timeout);
                    if reaped > 0 {
                        info!(reaped, timeout_secs = timeout.as_secs(), "reaped silent connections");
                    }
                }
            }
        }
        debug!("heartbeat reaper stopped");
    })
}
