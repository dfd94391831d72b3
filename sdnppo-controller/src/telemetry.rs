/**
 * TELEMETRY COLLECTOR - Boucles de collecte + snapshot métriques partagé
 *
 * RÔLE :
 * - Boucle stats : demande les compteurs de ports à chaque switch connecté; les
 *   réponses sont repliées en utilisation moyenne/max, taux de perte, débit,
 *   lissés exponentiellement (α = 0.5)
 * - Boucle cleanup : purge les flow records expirés et republie `active_flows`
 *
 * Seul écrivain des métriques lissées et des snapshots de ports. Les boucles
 * ne s'arrêtent jamais sur une erreur : elles loggent et attendent le tick suivant.
 */

use crate::config::ControllerConfig;
use crate::flows::FlowBook;
use crate::meter::{ControlState, RateLimiter};
use crate::models::{Dpid, MetricsSnapshot, PortCounters, PortNo, now_ts};
use crate::state::{new_rw_state, new_state, Shared, SharedRw};
use crate::switch::{dispatch, CommandOutcome, SwitchCommand, SwitchRegistry};
use std::collections::HashMap;
use tokio::task::{self, JoinHandle};
use tracing::{debug, warn};

pub const SMOOTHING: f64 = 0.5;
/// Plancher des intervalles de temps (secondes)
pub const MIN_ELAPSED: f64 = 1e-3;
// numéros >= OFPP_MAX = ports réservés (LOCAL, CONTROLLER...)
const OFPP_MAX: PortNo = 0xffff_ff00;

/// `α*old + (1-α)*sample`
pub fn smooth(old: f64, sample: f64) -> f64 {
    SMOOTHING * old + (1.0 - SMOOTHING) * sample
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PortSnapshot {
    tx_bytes: u64,
    tx_packets: u64,
    tx_dropped: u64,
    ts: f64,
}

/// Echantillon brut (non lissé) issu d'une réponse port-stats.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSample {
    pub mean_util: f64,
    pub max_util: f64,
    pub drop_rate: f64,
    pub throughput_mbps: f64,
    pub ports_measured: usize,
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    config: ControllerConfig,
    port_snapshots: Shared<HashMap<(Dpid, PortNo), PortSnapshot>>,
    metrics: SharedRw<MetricsSnapshot>,
    registry: SwitchRegistry,
    limiter: RateLimiter,
    book: FlowBook,
}

impl Telemetry {
    pub fn new(config: &ControllerConfig, registry: SwitchRegistry, limiter: RateLimiter, book: FlowBook) -> Self {
        let control = limiter.control();
        Self {
            config: config.clone(),
            port_snapshots: new_state(HashMap::new()),
            metrics: new_rw_state(MetricsSnapshot::zeroed(now_ts(), control.u, control.meter_kbps)),
            registry,
            limiter,
            book,
        }
    }

    /// Copie du snapshot, horodatée à l'instant de lecture.
    pub fn snapshot(&self, now: f64) -> MetricsSnapshot {
        let mut snapshot = self.metrics.read().clone();
        snapshot.ts = now;
        snapshot
    }

    pub fn publish_control(&self, control: ControlState) {
        let mut metrics = self.metrics.write();
        metrics.u = control.u;
        metrics.meter_kbps = control.meter_kbps;
    }

    /// Replie une réponse port-stats d'un switch dans les métriques lissées.
    /// Un port vu pour la première fois sert seulement de référence.
    pub fn handle_port_stats(&self, dpid: Dpid, ports: &[PortCounters], now: f64) -> StatsSample {
        let capacity_bps = self.config.link_capacity_bps();
        let mut utils = Vec::with_capacity(ports.len());
        let (mut total_bytes, mut total_packets, mut total_dropped) = (0u64, 0u64, 0u64);

        {
            let mut snapshots = self.port_snapshots.lock();
            for counters in ports.iter().filter(|c| c.port_no != 0 && c.port_no < OFPP_MAX) {
                let current = PortSnapshot {
                    tx_bytes: counters.tx_bytes,
                    tx_packets: counters.tx_packets,
                    tx_dropped: counters.tx_dropped,
                    ts: now,
                };
                if let Some(prev) = snapshots.insert((dpid, counters.port_no), current) {
                    let elapsed = (now - prev.ts).max(MIN_ELAPSED);
                    // compteurs remis à zéro côté switch => delta nul
                    let bytes = current.tx_bytes.saturating_sub(prev.tx_bytes);
                    let packets = current.tx_packets.saturating_sub(prev.tx_packets);
                    let dropped = current.tx_dropped.saturating_sub(prev.tx_dropped);

                    utils.push((bytes as f64 * 8.0 / elapsed) / capacity_bps);
                    total_bytes = total_bytes.saturating_add(bytes);
                    total_packets = total_packets.saturating_add(packets);
                    total_dropped = total_dropped.saturating_add(dropped);
                }
            }
        }

        let sample = StatsSample {
            mean_util: if utils.is_empty() { 0.0 } else { utils.iter().sum::<f64>() / utils.len() as f64 },
            max_util: utils.iter().copied().fold(0.0, f64::max),
            drop_rate: if total_packets > 0 { total_dropped as f64 / (total_packets as f64 + 1.0) } else { 0.0 },
            throughput_mbps: (total_bytes as f64 * 8.0 / self.config.stats_interval_s.max(MIN_ELAPSED)) / 1e6,
            ports_measured: utils.len(),
        };

        let control = self.limiter.control();
        let mut metrics = self.metrics.write();
        metrics.mean_util = smooth(metrics.mean_util, sample.mean_util);
        metrics.max_util = smooth(metrics.max_util, sample.max_util);
        metrics.drop_rate = smooth(metrics.drop_rate, sample.drop_rate);
        metrics.throughput_mbps = smooth(metrics.throughput_mbps, sample.throughput_mbps);
        metrics.u = control.u;
        metrics.meter_kbps = control.meter_kbps;
        metrics.ts = now;
        drop(metrics);

        debug!(dpid, ports = sample.ports_measured, mean_util = sample.mean_util, "port stats folded");
        sample
    }

    /// Purge les flow records trop vieux et republie leur nombre.
    pub fn cleanup(&self, now: f64) -> usize {
        let removed = self.book.expire(now, self.config.flow_expiry_s);
        let active = self.book.len();
        self.metrics.write().active_flows = active;
        if removed > 0 {
            debug!(removed, active, "expired flow records");
        }
        removed
    }

    /// Oublie les références de compteurs, les flow records et les métriques lissées;
    /// la valeur de contrôle est conservée.
    pub fn reset(&self, now: f64) {
        self.port_snapshots.lock().clear();
        self.book.clear();
        let control = self.limiter.control();
        *self.metrics.write() = MetricsSnapshot::zeroed(now, control.u, control.meter_kbps);
    }

    pub fn request_stats(&self) -> Vec<(Dpid, CommandOutcome)> {
        self.registry
            .all()
            .iter()
            .map(|sw| (sw.dpid(), dispatch(sw.as_ref(), SwitchCommand::PortStatsRequest)))
            .collect()
    }

    pub fn spawn_stats_loop(&self) -> JoinHandle<()> {
        let telemetry = self.clone();
        let period = self.config.stats_interval();
        task::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let outcomes = telemetry.request_stats();
                let failed = outcomes.iter().filter(|(_, o)| !o.is_sent()).count();
                if failed > 0 {
                    warn!(failed, polled = outcomes.len(), "stats cycle: some switches unreachable");
                }
            }
        })
    }

    pub fn spawn_cleanup_loop(&self) -> JoinHandle<()> {
        let telemetry = self.clone();
        let period = self.config.cleanup_interval();
        task::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                telemetry.cleanup(now_ts());
            }
        })
    }
}
