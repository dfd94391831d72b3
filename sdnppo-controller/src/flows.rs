/**
 * FLOW INSTALLER - Décision de forwarding sur packet-in
 *
 * RÔLE :
 * Apprend la position des hôtes, classe le trafic, calcule le chemin et installe
 * une règle par switch du chemin. Le meter n'est attaché qu'au premier switch
 * (côté source) : le policing a lieu une seule fois.
 *
 * REPLI :
 * ARP / non-IPv4 / broadcast / destination inconnue / pas de chemin => flood,
 * sans créer d'état. Switch du chemin non connecté ou port inconnu => sauté.
 *
 * BOOKKEEPING :
 * Chaque règle envoyée reçoit un cookie monotone; FlowBook garde cookie -> date
 * d'installation, purgé par la boucle de nettoyage (comptage télémétrie seulement).
 */

use crate::config::{ControllerConfig, ROUTED_FLOW_PRIORITY};
use crate::hosts::HostTable;
use crate::meter::RateLimiter;
use crate::models::{Dpid, PortNo};
use crate::packet::{parse_frame, Ipv4Header};
use crate::routing::{next_hop_port, shortest_path};
use crate::state::{new_state, Shared};
use crate::switch::{
    dispatch, CommandOutcome, FlowMatch, FlowRule, Output, SwitchCommand, SwitchHandle, SwitchRegistry,
    Transport, TransportMatch, ETH_TYPE_ARP, ETH_TYPE_IPV4, IP_PROTO_TCP, IP_PROTO_UDP,
};
use crate::topology::TopologyStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// ports iperf de l'expérience
const MICE_PORTS: [u16; 2] = [5201, 5202];
const ELEPHANT_PORT: u16 = 5203;
const SHOCK_PORT: u16 = 5204;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Mice,
    Elephant,
    Shock,
    Other,
}

impl TrafficClass {
    fn from_dst_port(port: Option<u16>) -> Self {
        match port {
            Some(p) if MICE_PORTS.contains(&p) => TrafficClass::Mice,
            Some(ELEPHANT_PORT) => TrafficClass::Elephant,
            Some(SHOCK_PORT) => TrafficClass::Shock,
            _ => TrafficClass::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub flow_match: FlowMatch,
    pub metered: bool,
    pub class: TrafficClass,
}

/// Seul l'UDP vers un port de l'ensemble `metered_ports` est limité.
pub fn classify(ip: &Ipv4Header, metered_ports: &BTreeSet<u16>) -> Classified {
    let protocol = match ip.protocol {
        IP_PROTO_UDP => Some(Transport::Udp),
        IP_PROTO_TCP => Some(Transport::Tcp),
        _ => None,
    };
    let transport = protocol
        .zip(ip.ports)
        .map(|(protocol, (src_port, dst_port))| TransportMatch { protocol, src_port, dst_port });
    let metered = matches!(transport, Some(t) if t.protocol == Transport::Udp && metered_ports.contains(&t.dst_port));
    Classified {
        flow_match: FlowMatch {
            eth_type: ETH_TYPE_IPV4,
            ipv4_src: ip.src,
            ipv4_dst: ip.dst,
            ip_proto: ip.protocol,
            transport,
        },
        metered,
        class: TrafficClass::from_dst_port(transport.map(|t| t.dst_port)),
    }
}

/// Flows supposés actifs : cookie -> date d'installation (secondes epoch).
#[derive(Debug, Clone)]
pub struct FlowBook {
    records: Shared<HashMap<u64, f64>>,
    next_cookie: Arc<AtomicU64>,
}

impl FlowBook {
    pub fn new() -> Self {
        Self { records: new_state(HashMap::new()), next_cookie: Arc::new(AtomicU64::new(1)) }
    }

    pub fn next_cookie(&self) -> u64 {
        self.next_cookie.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record(&self, cookie: u64, installed_at: f64) {
        self.records.lock().insert(cookie, installed_at);
    }

    /// Supprime les entrées plus vieilles que `horizon` secondes; renvoie le nombre supprimé.
    pub fn expire(&self, now: f64, horizon: f64) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, installed_at| now - *installed_at <= horizon);
        before - records.len()
    }

    pub fn contains(&self, cookie: u64) -> bool {
        self.records.lock().contains_key(&cookie)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for FlowBook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Unparsable,
    UnknownSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodReason {
    Arp,
    NotIpv4,
    Broadcast,
    UnknownDestination,
    NoPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRule {
    pub dpid: Dpid,
    pub cookie: u64,
    pub out_port: PortNo,
    pub metered: bool,
    pub outcome: CommandOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPacket {
    pub path: Vec<Dpid>,
    pub class: TrafficClass,
    pub metered: bool,
    pub rules: Vec<InstalledRule>,
    /// Sortie de la trame déclenchante (flood si le prochain saut est inconnu)
    pub packet_out: Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketDisposition {
    Ignored(IgnoreReason),
    Flooded { reason: FloodReason, outcome: CommandOutcome },
    Routed(RoutedPacket),
}

/// Packet-in tel que livré par la couche protocole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub dpid: Dpid,
    pub in_port: PortNo,
    pub buffer_id: Option<u32>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FlowInstaller {
    registry: SwitchRegistry,
    topology: TopologyStore,
    hosts: HostTable,
    limiter: RateLimiter,
    book: FlowBook,
    metered_ports: BTreeSet<u16>,
    idle_timeout: u16,
}

impl FlowInstaller {
    pub fn new(
        config: &ControllerConfig,
        registry: SwitchRegistry,
        topology: TopologyStore,
        hosts: HostTable,
        limiter: RateLimiter,
        book: FlowBook,
    ) -> Self {
        Self {
            registry,
            topology,
            hosts,
            limiter,
            book,
            metered_ports: config.metered_ports.clone(),
            idle_timeout: config.flow_idle_timeout_s,
        }
    }

    pub fn handle_packet_in(&self, pkt: &PacketIn, now: f64) -> PacketDisposition {
        let Some(switch) = self.registry.get(pkt.dpid) else {
            debug!(dpid = pkt.dpid, "packet-in from unregistered switch");
            return PacketDisposition::Ignored(IgnoreReason::UnknownSwitch);
        };
        let Some(frame) = parse_frame(&pkt.data) else {
            return PacketDisposition::Ignored(IgnoreReason::Unparsable);
        };

        if let Some(prev) = self.hosts.observe(frame.src, pkt.dpid, pkt.in_port) {
            debug!(host = %frame.src, from = prev.dpid, to = pkt.dpid, port = pkt.in_port, "host moved");
        }

        if frame.ethertype == ETH_TYPE_ARP {
            return self.flood(switch.as_ref(), pkt, FloodReason::Arp);
        }
        let Some(ip) = frame.ipv4 else {
            return self.flood(switch.as_ref(), pkt, FloodReason::NotIpv4);
        };
        if frame.dst.is_broadcast() || frame.dst.is_multicast() {
            return self.flood(switch.as_ref(), pkt, FloodReason::Broadcast);
        }
        let Some(dst) = self.hosts.lookup(&frame.dst) else {
            return self.flood(switch.as_ref(), pkt, FloodReason::UnknownDestination);
        };

        // la source vient d'être apprise sur ce switch
        let src_sw = pkt.dpid;
        let topo = self.topology.snapshot();
        let path = shortest_path(&topo, src_sw, dst.dpid);
        if path.is_empty() {
            return self.flood(switch.as_ref(), pkt, FloodReason::NoPath);
        }

        let classified = classify(&ip, &self.metered_ports);
        if classified.metered {
            if let Some(src_switch) = self.registry.get(src_sw) {
                self.limiter.ensure_installed(src_switch.as_ref());
            }
        }

        let mut rules = Vec::with_capacity(path.len());
        for (idx, &sw) in path.iter().enumerate() {
            let Some(handle) = self.registry.get(sw) else { continue };
            let out_port = match path.get(idx + 1) {
                None => Some(dst.port),
                Some(&next) => topo.outgoing_port(sw, next),
            };
            let Some(out_port) = out_port else { continue };

            let metered = classified.metered && sw == src_sw;
            let cookie = self.book.next_cookie();
            let rule = FlowRule {
                cookie,
                priority: ROUTED_FLOW_PRIORITY,
                flow_match: classified.flow_match,
                out_port,
                meter_id: metered.then(|| self.limiter.meter_id()),
                idle_timeout: self.idle_timeout,
                hard_timeout: 0,
            };
            let outcome = dispatch(handle.as_ref(), SwitchCommand::FlowMod(rule));
            if outcome.is_sent() {
                self.book.record(cookie, now);
            }
            rules.push(InstalledRule { dpid: sw, cookie, out_port, metered, outcome });
        }

        let packet_out = match next_hop_port(&topo, &path, pkt.dpid, dst.port) {
            Some(port) => Output::Port(port),
            None => Output::Flood,
        };
        self.packet_out(switch.as_ref(), pkt, packet_out);

        debug!(
            src = %ip.src, dst = %ip.dst, class = ?classified.class, metered = classified.metered,
            hops = path.len(), rules = rules.len(), "flow routed"
        );
        PacketDisposition::Routed(RoutedPacket {
            path,
            class: classified.class,
            metered: classified.metered,
            rules,
            packet_out,
        })
    }

    fn flood(&self, switch: &dyn SwitchHandle, pkt: &PacketIn, reason: FloodReason) -> PacketDisposition {
        let outcome = self.packet_out(switch, pkt, Output::Flood);
        PacketDisposition::Flooded { reason, outcome }
    }

    fn packet_out(&self, switch: &dyn SwitchHandle, pkt: &PacketIn, output: Output) -> CommandOutcome {
        // sans buffer côté switch, il faut renvoyer la trame elle-même
        let data = pkt.buffer_id.is_none().then(|| pkt.data.clone());
        dispatch(
            switch,
            SwitchCommand::PacketOut { buffer_id: pkt.buffer_id, in_port: pkt.in_port, output, data },
        )
    }
}
