use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Identifiant du meter unique installé sur chaque switch
pub const METER_ID: u32 = 1;
pub const TABLE_MISS_PRIORITY: u16 = 0;
pub const ROUTED_FLOW_PRIORITY: u16 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Capacité d'un lien (Mbit/s), dénominateur de l'utilisation
    pub link_capacity_mbps: f64,
    pub stats_interval_s: f64,
    pub cleanup_interval_s: f64,
    /// Age au-delà duquel un flow record est considéré expiré
    pub flow_expiry_s: f64,
    pub rate_min_kbps: u64,
    pub rate_max_kbps: u64,
    pub metered_ports: BTreeSet<u16>,
    pub flow_idle_timeout_s: u16,
    pub http_addr: String,
    pub southbound_addr: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            link_capacity_mbps: 20.0,
            stats_interval_s: 1.0,
            cleanup_interval_s: 5.0,
            flow_expiry_s: 120.0,
            rate_min_kbps: 2000,
            rate_max_kbps: 20000,
            metered_ports: BTreeSet::from([5203, 5204]),
            flow_idle_timeout_s: 60,
            http_addr: "0.0.0.0:8080".into(),
            southbound_addr: "127.0.0.1:6653".into(),
        }
    }
}

impl ControllerConfig {
    pub fn link_capacity_bps(&self) -> f64 {
        self.link_capacity_mbps * 1e6
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs_f64(self.stats_interval_s.max(1e-3))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cleanup_interval_s.max(1e-3))
    }

    /// Surcharge clé par clé depuis l'environnement. Une valeur illisible est
    /// ignorée (warning) et la valeur précédente conservée.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "SDNPPO_LINK_CAP_MBPS", &mut self.link_capacity_mbps);
        override_parsed(&lookup, "SDNPPO_STATS_INTERVAL_S", &mut self.stats_interval_s);
        override_parsed(&lookup, "SDNPPO_CLEANUP_INTERVAL_S", &mut self.cleanup_interval_s);
        override_parsed(&lookup, "SDNPPO_FLOW_EXPIRY_S", &mut self.flow_expiry_s);
        override_parsed(&lookup, "SDNPPO_RATE_MIN_KBPS", &mut self.rate_min_kbps);
        override_parsed(&lookup, "SDNPPO_RATE_MAX_KBPS", &mut self.rate_max_kbps);
        override_parsed(&lookup, "SDNPPO_FLOW_IDLE_TIMEOUT_S", &mut self.flow_idle_timeout_s);
        if let Some(addr) = lookup("SDNPPO_HTTP_ADDR") {
            self.http_addr = addr;
        }
        if let Some(addr) = lookup("SDNPPO_SOUTHBOUND_ADDR") {
            self.southbound_addr = addr;
        }
        if let Some(raw) = lookup("SDNPPO_METERED_PORTS") {
            match parse_port_list(&raw) {
                Some(ports) => self.metered_ports = ports,
                None => warn!(value = %raw, "invalid SDNPPO_METERED_PORTS, keeping {:?}", self.metered_ports),
            }
        }
    }

    /// Corrige les combinaisons incohérentes au lieu de refuser de démarrer.
    pub fn normalized(mut self) -> Self {
        if self.rate_min_kbps > self.rate_max_kbps {
            warn!(min = self.rate_min_kbps, max = self.rate_max_kbps, "rate bounds inverted, swapping");
            std::mem::swap(&mut self.rate_min_kbps, &mut self.rate_max_kbps);
        }
        if !(self.link_capacity_mbps > 0.0) {
            warn!(value = self.link_capacity_mbps, "non-positive link capacity, using default");
            self.link_capacity_mbps = ControllerConfig::default().link_capacity_mbps;
        }
        self
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = %raw, "invalid config value, keeping {:?}", slot),
    }
}

fn parse_port_list(raw: &str) -> Option<BTreeSet<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u16>().ok())
        .collect()
}

/// Lit un fichier YAML; `Ok(None)` si le fichier n'existe pas ou est vide.
pub async fn load_config_file<P: AsRef<Path>>(path: P) -> Result<Option<ControllerConfig>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path).await?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_yaml::from_str(&txt)?))
}

/// Fichier YAML optionnel (`SDNPPO_CONFIG`, défaut `sdnppo.yaml`) puis
/// surcharge par variables d'environnement.
pub async fn load_config() -> ControllerConfig {
    let path = std::env::var("SDNPPO_CONFIG").unwrap_or_else(|_| "sdnppo.yaml".into());
    let mut cfg = match load_config_file(&path).await {
        Ok(Some(cfg)) => {
            info!(%path, "loaded config file");
            cfg
        }
        Ok(None) => {
            info!(%path, "no config file, using defaults");
            ControllerConfig::default()
        }
        Err(e) => {
            warn!(%path, error = %e, "invalid config file, using defaults");
            ControllerConfig::default()
        }
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.normalized()
}
