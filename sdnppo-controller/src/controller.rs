/**
 * CONTROLLER - Assemble les composants et applique les événements réseau
 *
 * RÔLE :
 * Point d'entrée unique des événements (connexion/déconnexion de switch,
 * topologie, packet-in, réponses stats) et des opérations de la surface de
 * contrôle (lecture d'état, nouvelle valeur u, reset).
 *
 * CONCURRENCE :
 * Les événements sont traités séquentiellement par la tâche de dispatch; les
 * boucles de télémétrie et les requêtes HTTP tournent en parallèle et ne
 * partagent que des états protégés (voir state.rs).
 */

use crate::config::{ControllerConfig, TABLE_MISS_PRIORITY};
use crate::events::{EventReceiver, NetworkEvent};
use crate::flows::{FlowBook, FlowInstaller, PacketDisposition, PacketIn};
use crate::health::{ControllerHealth, HealthTracker};
use crate::hosts::HostTable;
use crate::meter::{ControlUpdate, RateLimiter};
use crate::models::{now_ts, Dpid, LinkDesc, MetricsSnapshot, PortCounters};
use crate::switch::{dispatch, CommandOutcome, SwitchCommand, SwitchHandle, SwitchRegistry};
use crate::telemetry::{StatsSample, Telemetry};
use crate::topology::TopologyStore;
use std::sync::Arc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info};

/// Ce qui a été poussé sur un switch à sa connexion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    pub dpid: Dpid,
    pub table_miss: CommandOutcome,
    pub meter: CommandOutcome,
}

#[derive(Debug, Clone)]
pub struct Controller {
    config: Arc<ControllerConfig>,
    registry: SwitchRegistry,
    topology: TopologyStore,
    hosts: HostTable,
    limiter: RateLimiter,
    book: FlowBook,
    flows: FlowInstaller,
    telemetry: Telemetry,
    health: HealthTracker,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let registry = SwitchRegistry::new();
        let topology = TopologyStore::new();
        let hosts = HostTable::new();
        let book = FlowBook::new();
        let limiter = RateLimiter::new(&config, registry.clone());
        let flows = FlowInstaller::new(
            &config,
            registry.clone(),
            topology.clone(),
            hosts.clone(),
            limiter.clone(),
            book.clone(),
        );
        let telemetry = Telemetry::new(&config, registry.clone(), limiter.clone(), book.clone());
        Self {
            config: Arc::new(config),
            registry,
            topology,
            hosts,
            limiter,
            book,
            flows,
            telemetry,
            health: HealthTracker::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SwitchRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.topology
    }

    pub fn hosts(&self) -> &HostTable {
        &self.hosts
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn flow_book(&self) -> &FlowBook {
        &self.book
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn handle_event(&self, event: NetworkEvent) {
        self.health.record_event();
        match event {
            NetworkEvent::SwitchConnected(switch) => {
                self.on_switch_connected(switch);
            }
            NetworkEvent::SwitchDisconnected { dpid, session: None } => {
                self.on_switch_disconnected(dpid);
            }
            NetworkEvent::SwitchDisconnected { dpid, session: Some(session) } => {
                self.on_session_disconnected(dpid, session);
            }
            NetworkEvent::TopologyChanged { switches, links } => self.on_topology_changed(&switches, &links),
            NetworkEvent::PacketIn(pkt) => {
                let disposition = self.on_packet_in(&pkt, now_ts());
                debug!(dpid = pkt.dpid, in_port = pkt.in_port, ?disposition, "packet-in handled");
            }
            NetworkEvent::PortStats { dpid, ports, received_at } => {
                self.on_port_stats(dpid, &ports, received_at);
            }
        }
    }

    /// Enregistre le switch, installe la règle table-miss puis assure le meter courant.
    pub fn on_switch_connected(&self, switch: Arc<dyn SwitchHandle>) -> ConnectReport {
        let dpid = switch.dpid();
        if !self.registry.connect(switch.clone()) {
            info!(dpid, "switch reconnected, replacing handle");
        }
        let table_miss = dispatch(switch.as_ref(), SwitchCommand::TableMiss { priority: TABLE_MISS_PRIORITY });
        let meter = self.limiter.ensure_installed(switch.as_ref());
        info!(dpid, connected = self.registry.len(), "switch connected");
        ConnectReport { dpid, table_miss, meter }
    }

    pub fn on_switch_disconnected(&self, dpid: Dpid) -> bool {
        let known = self.registry.disconnect(dpid).is_some();
        self.limiter.forget(dpid);
        if known {
            info!(dpid, connected = self.registry.len(), "switch disconnected");
        }
        known
    }

    /// Déconnexion remontée par une connexion de transport : sans effet si le
    /// switch s'est depuis ré-annoncé ailleurs.
    pub fn on_session_disconnected(&self, dpid: Dpid, session: u64) -> bool {
        if self.registry.disconnect_session(dpid, session).is_none() {
            debug!(dpid, session, "stale disconnect ignored, switch owned by another session");
            return false;
        }
        self.limiter.forget(dpid);
        info!(dpid, session, connected = self.registry.len(), "switch disconnected");
        true
    }

    pub fn on_topology_changed(&self, switches: &[Dpid], links: &[LinkDesc]) {
        self.topology.rebuild(switches, links);
    }

    pub fn on_packet_in(&self, pkt: &PacketIn, now: f64) -> PacketDisposition {
        self.flows.handle_packet_in(pkt, now)
    }

    pub fn on_port_stats(&self, dpid: Dpid, ports: &[PortCounters], received_at: f64) -> StatsSample {
        self.telemetry.handle_port_stats(dpid, ports, received_at)
    }

    /// Consomme la file d'événements jusqu'à sa fermeture.
    pub fn spawn_dispatcher(&self, mut events: EventReceiver) -> JoinHandle<()> {
        let controller = self.clone();
        task::spawn(async move {
            while let Some(event) = events.recv().await {
                controller.handle_event(event);
            }
            info!("event queue closed, dispatcher stopping");
        })
    }

    /// Démarre les boucles stats et cleanup (durée de vie du processus).
    pub fn spawn_background_loops(&self) -> [JoinHandle<()>; 2] {
        info!(
            stats_every = ?self.config.stats_interval(),
            cleanup_every = ?self.config.cleanup_interval(),
            "starting telemetry loops"
        );
        [self.telemetry.spawn_stats_loop(), self.telemetry.spawn_cleanup_loop()]
    }

    // --- surface de contrôle ---

    /// Snapshot des métriques; `u` et `meter_kbps` sont lus chez le limiteur,
    /// seule source de vérité pour la valeur de contrôle.
    pub fn state(&self) -> MetricsSnapshot {
        let mut snapshot = self.telemetry.snapshot(now_ts());
        let control = self.limiter.control();
        snapshot.u = control.u;
        snapshot.meter_kbps = control.meter_kbps;
        snapshot
    }

    pub fn apply_control(&self, u: f64) -> ControlUpdate {
        let update = self.limiter.set_control(u);
        self.telemetry.publish_control(update.state);
        update
    }

    pub fn reset(&self) {
        self.telemetry.reset(now_ts());
        info!("metrics and flow bookkeeping reset");
    }

    pub fn health(&self) -> ControllerHealth {
        let topo = self.topology.snapshot();
        ControllerHealth {
            uptime_seconds: self.health.uptime_seconds(),
            switches_connected: self.registry.len(),
            links: topo.link_count(),
            hosts_known: self.hosts.len(),
            meters_installed: self.limiter.installed_count(),
            active_flows: self.book.len(),
            events_handled: self.health.events_handled(),
        }
    }
}
