//! Décodage minimal des trames reçues en packet-in : Ethernet, IPv4, ports L4.

use crate::switch::{IP_PROTO_TCP, IP_PROTO_UDP};
use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub src: MacAddr,
    pub dst: MacAddr,
    pub ethertype: u16,
    pub ipv4: Option<Ipv4Header>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    /// (src, dst) pour TCP/UDP quand l'en-tête transport est lisible
    pub ports: Option<(u16, u16)>,
}

/// `None` si la trame est trop courte pour un en-tête Ethernet.
pub fn parse_frame(data: &[u8]) -> Option<ParsedFrame> {
    let eth = EthernetPacket::new(data)?;
    let ethertype = eth.get_ethertype().0;
    let ipv4 = if ethertype == crate::switch::ETH_TYPE_IPV4 { parse_ipv4(eth.payload()) } else { None };
    Some(ParsedFrame { src: eth.get_source(), dst: eth.get_destination(), ethertype, ipv4 })
}

fn parse_ipv4(data: &[u8]) -> Option<Ipv4Header> {
    let ip = Ipv4Packet::new(data)?;
    let protocol = ip.get_next_level_protocol().0;
    let ports = match protocol {
        IP_PROTO_UDP => UdpPacket::new(ip.payload()).map(|udp| (udp.get_source(), udp.get_destination())),
        IP_PROTO_TCP => TcpPacket::new(ip.payload()).map(|tcp| (tcp.get_source(), tcp.get_destination())),
        _ => None,
    };
    Some(Ipv4Header { src: ip.get_source(), dst: ip.get_destination(), protocol, ports })
}
