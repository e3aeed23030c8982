//! Heartbeat: the fixed-period scheduler that drives the limbic system.
//!
//! Nothing in the engines runs on its own timer. The heartbeat measures real
//! elapsed time between beats, feeds it to `tick(dt)`, and raises
//! `IdleTimeout` once per idle period while nobody is talking.

use crate::system::LimbicSystem;
use anima_core::{Event, OrganismConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Configuration for the limbic heartbeat
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often to tick the state evolution (default: 1s)
    pub interval: Duration,
    /// Silence after which each `IdleTimeout` is raised (default: 10 min)
    pub idle_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl HeartbeatConfig {
    pub fn from_config(config: &OrganismConfig) -> Self {
        let idle_timeout = if config.idle_timeout_secs.is_finite() {
            Duration::from_secs_f64(config.idle_timeout_secs.clamp(0.001, 1.0e9))
        } else {
            Self::default().idle_timeout
        };
        Self {
            interval: Duration::from_millis(config.heartbeat_ms.max(1)),
            idle_timeout,
        }
    }

    /// Very fast heartbeat for testing
    pub fn testing() -> Self {
        Self {
            interval: Duration::from_millis(10),
            idle_timeout: Duration::from_millis(50),
        }
    }
}

/// Decides when an idle period has elapsed, given the drive engine's
/// seconds-since-interaction counter.
#[derive(Debug, Clone)]
pub struct IdleTracker {
    period: f64,
    next_at: f64,
    last_seen: f64,
}

impl IdleTracker {
    pub fn new(idle_timeout: Duration) -> Self {
        let period = idle_timeout.as_secs_f64();
        Self {
            period,
            next_at: period,
            last_seen: 0.0,
        }
    }

    /// Returns true when `silence` has crossed the next idle boundary. A
    /// counter that went backwards means an interaction happened, which
    /// restarts the schedule.
    pub fn observe(&mut self, silence: f64) -> bool {
        if silence < self.last_seen {
            self.next_at = self.period;
        }
        self.last_seen = silence;
        if silence >= self.next_at {
            // Skip boundaries missed during a long gap; one event per beat.
            while self.next_at <= silence {
                self.next_at += self.period;
            }
            return true;
        }
        false
    }
}

/// Handle to a running heartbeat task. Dropping it stops the task.
pub struct Heartbeat {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the background heartbeat task
    pub fn spawn(limbic: Arc<LimbicSystem>, config: HeartbeatConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut idle = IdleTracker::new(config.idle_timeout);
            let mut last_tick = Instant::now();

            tracing::debug!(
                "Heartbeat started (interval {:?}, idle timeout {:?})",
                config.interval,
                config.idle_timeout
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let dt = now.duration_since(last_tick).as_secs_f32();
                        last_tick = now;

                        if let Err(e) = limbic.tick(dt) {
                            tracing::warn!("Heartbeat tick failed: {}", e);
                            continue;
                        }

                        if idle.observe(limbic.seconds_since_interaction()) {
                            tracing::debug!("Idle period elapsed, raising IdleTimeout");
                            if let Err(e) = limbic.apply_event(&Event::IdleTimeout) {
                                tracing::warn!("IdleTimeout rejected: {}", e);
                            }
                        }
                    }
                    // Fires on an explicit shutdown and when the handle is dropped.
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Heartbeat stopped");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the task and wait for the current beat to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let Heartbeat {
            shutdown_tx,
            handle,
        } = self;
        let _ = shutdown_tx.send(true);
        handle
            .await
            .map_err(|e| anyhow::anyhow!("Heartbeat task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::AnimaConfig;

    fn limbic() -> Arc<LimbicSystem> {
        Arc::new(LimbicSystem::new(&AnimaConfig::default()).unwrap())
    }

    #[test]
    fn test_idle_tracker_fires_once_per_period() {
        let mut idle = IdleTracker::new(Duration::from_secs(10));
        assert!(!idle.observe(4.0));
        assert!(!idle.observe(9.9));
        assert!(idle.observe(10.0));
        assert!(!idle.observe(15.0));
        assert!(idle.observe(20.5));
        // A long gap raises one event, not one per missed period.
        assert!(idle.observe(55.0));
        assert!(!idle.observe(59.0));
        assert!(idle.observe(60.0));
    }

    #[test]
    fn test_idle_tracker_resets_on_interaction() {
        let mut idle = IdleTracker::new(Duration::from_secs(10));
        assert!(idle.observe(12.0));
        // Counter restarted by a message.
        assert!(!idle.observe(1.0));
        assert!(!idle.observe(9.0));
        assert!(idle.observe(10.0));
    }

    #[test]
    fn test_from_config() {
        let config = OrganismConfig {
            heartbeat_ms: 250,
            idle_timeout_secs: 30.0,
            ..OrganismConfig::default()
        };
        let hb = HeartbeatConfig::from_config(&config);
        assert_eq!(hb.interval, Duration::from_millis(250));
        assert_eq!(hb.idle_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_heartbeat_publishes_ticks() {
        let limbic = limbic();
        let mut rx = limbic.subscribe();
        let heartbeat = Heartbeat::spawn(Arc::clone(&limbic), HeartbeatConfig::testing());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("heartbeat should publish within 2s")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limbic.seconds_since_interaction() > 0.0);

        heartbeat.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_restores_energy() {
        let limbic = limbic();
        let mut snapshot = limbic.export();
        snapshot.state.energy = 0.4;
        limbic.restore(snapshot);

        let heartbeat = Heartbeat::spawn(Arc::clone(&limbic), HeartbeatConfig::testing());
        tokio::time::sleep(Duration::from_millis(300)).await;
        heartbeat.shutdown().await.unwrap();

        let energy = limbic.snapshot().energy;
        assert!(energy > 0.45, "idle recovery should raise energy, got {}", energy);
    }

    #[tokio::test]
    async fn test_dropped_heartbeat_stops_ticking() {
        let limbic = limbic();
        let heartbeat = Heartbeat::spawn(Arc::clone(&limbic), HeartbeatConfig::testing());
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(heartbeat);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frozen = limbic.seconds_since_interaction();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limbic.seconds_since_interaction(), frozen);
    }
}
