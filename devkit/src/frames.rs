/*!
Fabrication de trames Ethernet pour simuler des packet-in

Les trames sont construites avec les paquets mutables de pnet et relues
telles quelles par le décodeur du contrôleur.
*/

use pnet::packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

const ETH_LEN: usize = 14;
const IPV4_LEN: usize = 20;
const UDP_LEN: usize = 8;
const TCP_LEN: usize = 20;
const ARP_LEN: usize = 28;

/// Un hôte simulé : adresse MAC + IPv4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAddr {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl HostAddr {
    /// Hôte n°`n` : MAC 00:00:00:00:00:n, IP 10.0.0.n
    pub fn numbered(n: u8) -> Self {
        Self { mac: MacAddr::new(0, 0, 0, 0, 0, n), ip: Ipv4Addr::new(10, 0, 0, n) }
    }
}

/// Helper pour créer des trames entre deux hôtes
#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder {
    src: HostAddr,
    dst: HostAddr,
}

impl FrameBuilder {
    pub fn new(src: HostAddr, dst: HostAddr) -> Self {
        Self { src, dst }
    }

    /// Trame retour (adresses inversées)
    pub fn reversed(&self) -> Self {
        Self { src: self.dst, dst: self.src }
    }

    pub fn udp(&self, src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut buf = self.ipv4_frame(IpNextHeaderProtocols::Udp, UDP_LEN);
        if let Some(mut udp) = MutableUdpPacket::new(&mut buf[ETH_LEN + IPV4_LEN..]) {
            udp.set_source(src_port);
            udp.set_destination(dst_port);
            udp.set_length(UDP_LEN as u16);
        }
        buf
    }

    pub fn tcp(&self, src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut buf = self.ipv4_frame(IpNextHeaderProtocols::Tcp, TCP_LEN);
        if let Some(mut tcp) = MutableTcpPacket::new(&mut buf[ETH_LEN + IPV4_LEN..]) {
            tcp.set_source(src_port);
            tcp.set_destination(dst_port);
            tcp.set_data_offset(5);
        }
        buf
    }

    /// Requête ARP : seul l'ethertype compte pour le contrôleur.
    pub fn arp(&self) -> Vec<u8> {
        self.ethernet(EtherTypes::Arp, MacAddr::broadcast(), ARP_LEN)
    }

    /// IPv4 UDP à destination du broadcast Ethernet
    pub fn broadcast_udp(&self, dst_port: u16) -> Vec<u8> {
        let mut buf = self.udp(40000, dst_port);
        if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
            eth.set_destination(MacAddr::broadcast());
        }
        buf
    }

    /// Trame IPv6 minimale (non-IPv4)
    pub fn ipv6(&self) -> Vec<u8> {
        self.ethernet(EtherTypes::Ipv6, self.dst.mac, 40)
    }

    fn ethernet(&self, ethertype: EtherType, dst: MacAddr, payload_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; ETH_LEN + payload_len];
        if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
            eth.set_destination(dst);
            eth.set_source(self.src.mac);
            eth.set_ethertype(ethertype);
        }
        buf
    }

    fn ipv4_frame(&self, protocol: IpNextHeaderProtocol, l4_len: usize) -> Vec<u8> {
        let mut buf = self.ethernet(EtherTypes::Ipv4, self.dst.mac, IPV4_LEN + l4_len);
        if let Some(mut ip) = MutableIpv4Packet::new(&mut buf[ETH_LEN..]) {
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((IPV4_LEN + l4_len) as u16);
            ip.set_ttl(64);
            ip.set_next_level_protocol(protocol);
            ip.set_source(self.src.ip);
            ip.set_destination(self.dst.ip);
            let checksum = ipv4::checksum(&ip.to_immutable());
            ip.set_checksum(checksum);
        }
        buf
    }
}
