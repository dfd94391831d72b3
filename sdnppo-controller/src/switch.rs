/**
 * SWITCH COMMANDS - Interface sortante vers les switches (southbound)
 *
 * RÔLE :
 * Décrit les commandes produites par le contrôleur (table-miss, meter, flow,
 * stats, packet-out) et le registre des switches connectés.
 *
 * FONCTIONNEMENT :
 * - SwitchHandle = envoi fire-and-forget, jamais bloquant
 * - Chaque envoi donne un CommandOutcome (Sent / Failed) : l'échec est loggé
 *   et observable par les tests, mais ne remonte jamais comme erreur fatale
 * - ChannelSwitch = handle adossé à un canal tokio, consommé par la couche protocole
 */

use crate::models::{Dpid, PortNo};
use crate::state::{new_rw_state, SharedRw};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

/// Erreurs possibles lors d'un envoi vers un switch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SwitchError {
    #[error("switch {0} is not connected")]
    NotConnected(Dpid),
    #[error("command channel closed")]
    ChannelClosed,
    #[error("switch rejected command: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterCommand {
    Add,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMatch {
    pub protocol: Transport,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Clé de match d'une règle routée (IPv4 unicast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMatch {
    pub eth_type: u16,
    pub ipv4_src: Ipv4Addr,
    pub ipv4_dst: Ipv4Addr,
    pub ip_proto: u8,
    pub transport: Option<TransportMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub cookie: u64,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub out_port: PortNo,
    pub meter_id: Option<u32>,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Port(PortNo),
    Flood,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchCommand {
    /// Règle par défaut : tout ce qui ne matche pas remonte au contrôleur
    TableMiss { priority: u16 },
    MeterMod {
        command: MeterCommand,
        meter_id: u32,
        rate_kbps: u64,
        burst_size: u64,
    },
    FlowMod(FlowRule),
    PortStatsRequest,
    PacketOut {
        buffer_id: Option<u32>,
        in_port: PortNo,
        output: Output,
        /// Présent seulement si le switch n'a pas bufferisé la trame
        data: Option<Vec<u8>>,
    },
}

impl SwitchCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            SwitchCommand::TableMiss { .. } => "table-miss",
            SwitchCommand::MeterMod { .. } => "meter-mod",
            SwitchCommand::FlowMod(_) => "flow-mod",
            SwitchCommand::PortStatsRequest => "port-stats-request",
            SwitchCommand::PacketOut { .. } => "packet-out",
        }
    }
}

/// Commande adressée, format échangé avec la couche protocole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedCommand {
    pub dpid: Dpid,
    pub command: SwitchCommand,
}

/// Résultat d'un envoi individuel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Sent,
    Failed(String),
}

impl CommandOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, CommandOutcome::Sent)
    }
}

/// Connexion vers un switch. `send` ne doit jamais bloquer.
pub trait SwitchHandle: Send + Sync + std::fmt::Debug {
    fn dpid(&self) -> Dpid;
    fn send(&self, command: SwitchCommand) -> Result<(), SwitchError>;

    /// Connexion de transport portant ce handle, si elle est identifiée.
    fn session(&self) -> Option<u64> {
        None
    }
}

/// Envoie, logge l'échec éventuel avec l'identité du switch, et résume le résultat.
pub fn dispatch(switch: &dyn SwitchHandle, command: SwitchCommand) -> CommandOutcome {
    let kind = command.kind();
    match switch.send(command) {
        Ok(()) => CommandOutcome::Sent,
        Err(e) => {
            warn!(dpid = switch.dpid(), command = kind, error = %e, "switch command failed");
            CommandOutcome::Failed(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSwitch {
    dpid: Dpid,
    session: Option<u64>,
    tx: mpsc::UnboundedSender<AddressedCommand>,
}

impl ChannelSwitch {
    pub fn new(dpid: Dpid, tx: mpsc::UnboundedSender<AddressedCommand>) -> Self {
        Self { dpid, session: None, tx }
    }

    pub fn with_session(dpid: Dpid, session: u64, tx: mpsc::UnboundedSender<AddressedCommand>) -> Self {
        Self { dpid, session: Some(session), tx }
    }

    /// Handle + récepteur dédié, pratique pour brancher un seul switch.
    pub fn pair(dpid: Dpid) -> (Self, mpsc::UnboundedReceiver<AddressedCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(dpid, tx), rx)
    }
}

impl SwitchHandle for ChannelSwitch {
    fn dpid(&self) -> Dpid {
        self.dpid
    }

    fn session(&self) -> Option<u64> {
        self.session
    }

    fn send(&self, command: SwitchCommand) -> Result<(), SwitchError> {
        self.tx
            .send(AddressedCommand { dpid: self.dpid, command })
            .map_err(|_| SwitchError::ChannelClosed)
    }
}

/// Switches actuellement connectés, indexés par dpid.
#[derive(Debug, Clone)]
pub struct SwitchRegistry {
    switches: SharedRw<BTreeMap<Dpid, Arc<dyn SwitchHandle>>>,
}

impl SwitchRegistry {
    pub fn new() -> Self {
        Self { switches: new_rw_state(BTreeMap::new()) }
    }

    /// Renvoie `true` si le switch était inconnu (une reconnexion remplace le handle).
    pub fn connect(&self, switch: Arc<dyn SwitchHandle>) -> bool {
        self.switches.write().insert(switch.dpid(), switch).is_none()
    }

    pub fn disconnect(&self, dpid: Dpid) -> Option<Arc<dyn SwitchHandle>> {
        self.switches.write().remove(&dpid)
    }

    /// Retire le switch seulement si son handle courant vient de `session` :
    /// une reconnexion sur une autre connexion n'est pas touchée.
    pub fn disconnect_session(&self, dpid: Dpid, session: u64) -> Option<Arc<dyn SwitchHandle>> {
        let mut switches = self.switches.write();
        let owned = switches.get(&dpid).is_some_and(|current| current.session() == Some(session));
        if owned {
            switches.remove(&dpid)
        } else {
            None
        }
    }

    pub fn get(&self, dpid: Dpid) -> Option<Arc<dyn SwitchHandle>> {
        self.switches.read().get(&dpid).cloned()
    }

    pub fn is_connected(&self, dpid: Dpid) -> bool {
        self.switches.read().contains_key(&dpid)
    }

    /// Copie de la liste : les envois se font hors verrou.
    pub fn all(&self) -> Vec<Arc<dyn SwitchHandle>> {
        self.switches.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<Dpid> {
        self.switches.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.switches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.read().is_empty()
    }

    pub fn send_to(&self, dpid: Dpid, command: SwitchCommand) -> CommandOutcome {
        match self.get(dpid) {
            Some(switch) => dispatch(switch.as_ref(), command),
            None => CommandOutcome::Failed(SwitchError::NotConnected(dpid).to_string()),
        }
    }
}

impl Default for SwitchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_switch_addresses_commands() {
        let (switch, mut rx) = ChannelSwitch::pair(9);
        assert_eq!(dispatch(&switch, SwitchCommand::PortStatsRequest), CommandOutcome::Sent);
        let cmd = rx.try_recv().unwrap();
        assert_eq!(cmd.dpid, 9);
        assert_eq!(cmd.command, SwitchCommand::PortStatsRequest);
    }

    #[test]
    fn closed_channel_is_reported_not_raised() {
        let (switch, rx) = ChannelSwitch::pair(2);
        drop(rx);
        let outcome = dispatch(&switch, SwitchCommand::TableMiss { priority: 0 });
        assert_eq!(outcome, CommandOutcome::Failed("command channel closed".into()));
    }

    #[test]
    fn registry_connect_and_disconnect() {
        let registry = SwitchRegistry::new();
        let (a, _rx_a) = ChannelSwitch::pair(1);
        let (b, _rx_b) = ChannelSwitch::pair(2);
        assert!(registry.connect(Arc::new(a.clone())));
        assert!(registry.connect(Arc::new(b)));
        assert!(!registry.connect(Arc::new(a)));
        assert_eq!(registry.ids(), vec![1, 2]);

        assert!(registry.disconnect(1).is_some());
        assert!(registry.disconnect(1).is_none());
        assert!(!registry.is_connected(1));
        assert_eq!(
            registry.send_to(1, SwitchCommand::PortStatsRequest),
            CommandOutcome::Failed("switch 1 is not connected".into())
        );
    }

    #[test]
    fn command_wire_format() {
        let cmd = AddressedCommand {
            dpid: 3,
            command: SwitchCommand::PacketOut { buffer_id: None, in_port: 1, output: Output::Flood, data: Some(vec![1, 2]) },
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["dpid"], 3);
        assert_eq!(json["command"]["type"], "packet_out");
        assert_eq!(json["command"]["output"], "flood");
        let back: AddressedCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn session_disconnect_spares_newer_connection() {
        let registry = SwitchRegistry::new();
        let (tx_old, _rx_old) = mpsc::unbounded_channel();
        let (tx_new, _rx_new) = mpsc::unbounded_channel();
        registry.connect(Arc::new(ChannelSwitch::with_session(7, 1, tx_old)));
        registry.connect(Arc::new(ChannelSwitch::with_session(7, 2, tx_new)));

        assert!(registry.disconnect_session(7, 1).is_none());
        assert_eq!(registry.get(7).and_then(|sw| sw.session()), Some(2));
        assert!(registry.disconnect_session(7, 2).is_some());
        assert!(!registry.is_connected(7));
    }
}
