/**
 * SOUTHBOUND BRIDGE - Transport JSON-lines vers l'agent protocole (OpenFlow)
 *
 * FONCTIONNEMENT :
 * - L'agent se connecte en TCP et envoie un `WireEvent` JSON par ligne
 * - `switch_connected` enregistre un ChannelSwitch lié à cette connexion
 * - Les commandes repartent en `AddressedCommand` JSON, une par ligne
 * - Connexion fermée => tous les switches annoncés dessus sont déconnectés,
 *   sauf ceux ré-annoncés entre-temps sur une autre connexion (session)
 *
 * Le codage OpenFlow lui-même reste dans l'agent.
 */

use crate::events::{EventSender, NetworkEvent};
use crate::flows::PacketIn;
use crate::models::{now_ts, Dpid, LinkDesc, PortCounters, PortNo};
use crate::switch::{AddressedCommand, ChannelSwitch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    SwitchConnected { dpid: Dpid },
    SwitchDisconnected { dpid: Dpid },
    TopologyChanged { switches: Vec<Dpid>, links: Vec<LinkDesc> },
    PacketIn {
        dpid: Dpid,
        in_port: PortNo,
        #[serde(default)]
        buffer_id: Option<u32>,
        data: Vec<u8>,
    },
    PortStats { dpid: Dpid, ports: Vec<PortCounters> },
}

impl WireEvent {
    /// Les commandes des switches annoncés repartent par `commands`, marquées
    /// de la `session` de la connexion; les réponses stats sont horodatées à la réception.
    pub fn into_event(
        self,
        session: u64,
        commands: &mpsc::UnboundedSender<AddressedCommand>,
        received_at: f64,
    ) -> NetworkEvent {
        match self {
            WireEvent::SwitchConnected { dpid } => {
                NetworkEvent::SwitchConnected(Arc::new(ChannelSwitch::with_session(dpid, session, commands.clone())))
            }
            WireEvent::SwitchDisconnected { dpid } => NetworkEvent::SwitchDisconnected { dpid, session: Some(session) },
            WireEvent::TopologyChanged { switches, links } => NetworkEvent::TopologyChanged { switches, links },
            WireEvent::PacketIn { dpid, in_port, buffer_id, data } => {
                NetworkEvent::PacketIn(PacketIn { dpid, in_port, buffer_id, data })
            }
            WireEvent::PortStats { dpid, ports } => NetworkEvent::PortStats { dpid, ports, received_at },
        }
    }
}

/// Accepte les agents protocole indéfiniment.
pub async fn serve(listener: TcpListener, events: EventSender) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "southbound bridge listening");
    }
    let mut next_session: u64 = 1;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_agent(stream, peer, next_session, events.clone()));
                next_session += 1;
            }
            Err(e) => {
                warn!(error = %e, "southbound accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_agent(stream: TcpStream, peer: SocketAddr, session: u64, events: EventSender) {
    info!(%peer, session, "protocol agent connected");
    let (reader, mut writer) = stream.into_split();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AddressedCommand>();

    let writer_task = tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let mut line = match serde_json::to_vec(&cmd) {
                Ok(line) => line,
                Err(e) => {
                    warn!(dpid = cmd.dpid, error = %e, "failed to encode switch command");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = writer.write_all(&line).await {
                warn!(%peer, error = %e, "southbound write failed");
                break;
            }
        }
    });

    let mut announced: BTreeSet<Dpid> = BTreeSet::new();
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "southbound read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let wire = match serde_json::from_str::<WireEvent>(&line) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(%peer, error = %e, "malformed southbound event, skipped");
                continue;
            }
        };
        match &wire {
            WireEvent::SwitchConnected { dpid } => {
                announced.insert(*dpid);
            }
            WireEvent::SwitchDisconnected { dpid } => {
                announced.remove(dpid);
            }
            _ => {}
        }
        if events.send(wire.into_event(session, &cmd_tx, now_ts())).is_err() {
            warn!("event queue closed, dropping southbound connection");
            break;
        }
    }

    for dpid in announced {
        events.send(NetworkEvent::SwitchDisconnected { dpid, session: Some(session) }).ok();
    }
    writer_task.abort();
    info!(%peer, session, "protocol agent disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::Controller;
    use crate::events::event_channel;
    use crate::switch::{SwitchCommand, SwitchHandle};

    #[test]
    fn wire_event_decoding() {
        let json = r#"{"event":"packet_in","dpid":2,"in_port":3,"data":[1,2,3]}"#;
        let wire: WireEvent = serde_json::from_str(json).unwrap();
        assert_eq!(wire, WireEvent::PacketIn { dpid: 2, in_port: 3, buffer_id: None, data: vec![1, 2, 3] });

        let json = r#"{"event":"port_stats","dpid":1,"ports":[{"port_no":1,"tx_bytes":10,"tx_packets":1,"tx_dropped":0}]}"#;
        let (tx, _rx) = mpsc::unbounded_channel();
        let event = serde_json::from_str::<WireEvent>(json).unwrap().into_event(3, &tx, 42.0);
        assert!(matches!(event, NetworkEvent::PortStats { dpid: 1, received_at, .. } if received_at == 42.0));
    }

    #[tokio::test]
    async fn agent_roundtrip_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events, mut rx) = event_channel();
        tokio::spawn(serve(listener, events));

        let agent = TcpStream::connect(addr).await.unwrap();
        let (agent_rx, mut agent_tx) = agent.into_split();
        agent_tx.write_all(b"{\"event\":\"switch_connected\",\"dpid\":7}\n").await.unwrap();
        agent_tx.write_all(b"this is not json\n").await.unwrap();
        agent_tx.write_all(b"{\"event\":\"topology_changed\",\"switches\":[7],\"links\":[]}\n").await.unwrap();

        let NetworkEvent::SwitchConnected(handle) = rx.recv().await.unwrap() else { panic!("expected connect") };
        assert_eq!(handle.dpid(), 7);
        // la ligne invalide est ignorée, l'événement suivant arrive
        assert!(matches!(rx.recv().await.unwrap(), NetworkEvent::TopologyChanged { .. }));

        handle.send(SwitchCommand::PortStatsRequest).unwrap();
        let mut lines = BufReader::new(agent_rx).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let cmd: AddressedCommand = serde_json::from_str(&line).unwrap();
        assert_eq!(cmd, AddressedCommand { dpid: 7, command: SwitchCommand::PortStatsRequest });

        drop(agent_tx);
        drop(lines);
        assert!(matches!(
            rx.recv().await.unwrap(),
            NetworkEvent::SwitchDisconnected { dpid: 7, session: Some(s) } if Some(s) == handle.session()
        ));
    }

    #[tokio::test]
    async fn closing_old_connection_spares_reannounced_switch() {
        let controller = Controller::new(ControllerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events, mut rx) = event_channel();
        tokio::spawn(serve(listener, events));

        let mut old = TcpStream::connect(addr).await.unwrap();
        old.write_all(b"{\"event\":\"switch_connected\",\"dpid\":7}\n").await.unwrap();
        controller.handle_event(rx.recv().await.unwrap());

        let mut new = TcpStream::connect(addr).await.unwrap();
        new.write_all(b"{\"event\":\"switch_connected\",\"dpid\":7}\n").await.unwrap();
        controller.handle_event(rx.recv().await.unwrap());
        let owner = controller.registry().get(7).and_then(|sw| sw.session());

        drop(old);
        let closed = rx.recv().await.unwrap();
        assert!(matches!(closed, NetworkEvent::SwitchDisconnected { dpid: 7, session: Some(_) }));
        controller.handle_event(closed);

        assert!(controller.registry().is_connected(7));
        assert_eq!(controller.registry().get(7).and_then(|sw| sw.session()), owner);
        assert!(controller.limiter().is_installed(7));
        drop(new);
    }
}
