use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifiant stable d'un switch (datapath id).
pub type Dpid = u64;
pub type PortNo = u32;

/// Lien inter-switch tel que remonté par la découverte de topologie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDesc {
    pub src: Dpid,
    pub src_port: PortNo,
    pub dst: Dpid,
    pub dst_port: PortNo,
}

/// Compteurs cumulés d'un port (réponse port-stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCounters {
    pub port_no: PortNo,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_dropped: u64,
}

/// Etat exporté par GET /sdnppo/state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ts: f64,
    pub u: f64,
    pub meter_kbps: u64,
    pub mean_util: f64,
    pub max_util: f64,
    pub drop_rate: f64,
    pub throughput_mbps: f64,
    pub active_flows: usize,
}

impl MetricsSnapshot {
    pub fn zeroed(ts: f64, u: f64, meter_kbps: u64) -> Self {
        Self {
            ts,
            u,
            meter_kbps,
            mean_util: 0.0,
            max_util: 0.0,
            drop_rate: 0.0,
            throughput_mbps: 0.0,
            active_flows: 0,
        }
    }
}

/// Horloge murale en secondes epoch (même échelle que le champ `ts`).
pub fn now_ts() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}
