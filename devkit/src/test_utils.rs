/*!
Test Harness pour le contrôleur SDN-PPO

Facilite l'écriture de tests avec :
- Un contrôleur réel branché sur des switches simulés
- Construction de topologies linéaires
- Assertions sur les commandes reçues par chaque switch
*/

use crate::switch_stub::MockSwitch;
use sdnppo_controller::config::ControllerConfig;
use sdnppo_controller::controller::ConnectReport;
use sdnppo_controller::models::{now_ts, Dpid, LinkDesc, PortCounters, PortNo};
use sdnppo_controller::telemetry::StatsSample;
use sdnppo_controller::{Controller, PacketDisposition, PacketIn};
use std::collections::{BTreeMap, HashMap};
use anyhow::Result;

/// Port local d'un switch dans `linear` : vers le voisin de gauche / de droite.
pub const LEFT_PORT: PortNo = 1;
pub const RIGHT_PORT: PortNo = 2;

/// Harness de test complet : contrôleur + switches simulés
pub struct TestHarness {
    pub controller: Controller,
    switches: BTreeMap<Dpid, MockSwitch>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        init_tracing();
        Self { controller: Controller::new(config), switches: BTreeMap::new() }
    }

    /// Connecte un switch simulé (table-miss + meter poussés par le contrôleur).
    pub fn connect(&mut self, dpid: Dpid) -> ConnectReport {
        let switch = MockSwitch::new(dpid);
        let report = self.controller.on_switch_connected(switch.handle());
        self.switches.insert(dpid, switch);
        report
    }

    pub fn disconnect(&mut self, dpid: Dpid) -> bool {
        self.switches.remove(&dpid);
        self.controller.on_switch_disconnected(dpid)
    }

    /// Chaîne 1 - 2 - ... - n : chaque switch sort vers i+1 par RIGHT_PORT
    /// et vers i-1 par LEFT_PORT. Les hôtes se branchent sur les ports >= 3.
    pub fn linear(&mut self, n: Dpid) -> &mut Self {
        for dpid in 1..=n {
            self.connect(dpid);
        }
        let links: Vec<LinkDesc> = (1..n)
            .map(|i| LinkDesc { src: i, src_port: RIGHT_PORT, dst: i + 1, dst_port: LEFT_PORT })
            .collect();
        let switches: Vec<Dpid> = (1..=n).collect();
        self.controller.on_topology_changed(&switches, &links);
        self
    }

    pub fn switch(&self, dpid: Dpid) -> Option<&MockSwitch> {
        self.switches.get(&dpid)
    }

    /// Oublie les commandes déjà enregistrées sur tous les switches
    pub fn clear_commands(&self) {
        self.switches.values().for_each(MockSwitch::clear);
    }

    pub fn packet_in(&self, dpid: Dpid, in_port: PortNo, frame: Vec<u8>) -> PacketDisposition {
        self.controller.on_packet_in(&PacketIn { dpid, in_port, buffer_id: None, data: frame }, now_ts())
    }

    pub fn port_stats(&self, dpid: Dpid, ports: &[PortCounters], at: f64) -> StatsSample {
        self.controller.on_port_stats(dpid, ports, at)
    }

    /// Assert qu'un switch a reçu exactement `count` commandes du type donné
    pub fn assert_command_count(&self, dpid: Dpid, kind: &str, count: usize) -> Result<()> {
        let Some(switch) = self.switches.get(&dpid) else {
            anyhow::bail!("switch {} not connected in harness", dpid);
        };
        let actual = switch.count(kind);
        if actual != count {
            anyhow::bail!("switch {}: expected {} '{}' commands, got {}", dpid, count, kind, actual);
        }
        Ok(())
    }

    /// Stats sur les commandes collectées
    pub fn get_stats(&self) -> TestStats {
        let mut per_kind = HashMap::new();
        let mut total = 0;
        for switch in self.switches.values() {
            for command in switch.commands() {
                *per_kind.entry(command.kind()).or_insert(0) += 1;
                total += 1;
            }
        }
        TestStats { total_commands: total, per_kind, switches: self.switches.len() }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_commands: usize,
    pub per_kind: HashMap<&'static str, usize>,
    pub switches: usize,
}

/// Logs des tests via tracing, filtrés par RUST_LOG (init unique).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}
