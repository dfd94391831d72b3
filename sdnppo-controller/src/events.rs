//! Evénements réseau consommés par le contrôleur, dans l'ordre d'arrivée,
//! par une seule tâche de dispatch.

use crate::flows::PacketIn;
use crate::models::{Dpid, LinkDesc, PortCounters};
use crate::switch::SwitchHandle;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum NetworkEvent {
    SwitchConnected(Arc<dyn SwitchHandle>),
    /// `session` renseigné : ne concerne que le handle venu de cette connexion
    SwitchDisconnected { dpid: Dpid, session: Option<u64> },
    /// Liste complète (switches + liens), pas un delta
    TopologyChanged { switches: Vec<Dpid>, links: Vec<LinkDesc> },
    PacketIn(PacketIn),
    PortStats { dpid: Dpid, ports: Vec<PortCounters>, received_at: f64 },
}

pub type EventSender = mpsc::UnboundedSender<NetworkEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NetworkEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
