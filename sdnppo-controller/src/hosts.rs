//! Table de localisation des hôtes : MAC -> (switch, port d'entrée).
//! Dernière observation gagnante, aucune expiration.

use crate::models::{Dpid, PortNo};
use crate::state::{new_state, Shared};
use pnet::util::MacAddr;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLocation {
    pub dpid: Dpid,
    pub port: PortNo,
}

#[derive(Debug, Clone)]
pub struct HostTable {
    entries: Shared<HashMap<MacAddr, HostLocation>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self { entries: new_state(HashMap::new()) }
    }

    /// Enregistre/écrase la position; renvoie l'ancienne si elle diffère.
    pub fn observe(&self, host: MacAddr, dpid: Dpid, port: PortNo) -> Option<HostLocation> {
        let location = HostLocation { dpid, port };
        let previous = self.entries.lock().insert(host, location);
        previous.filter(|prev| *prev != location)
    }

    pub fn lookup(&self, host: &MacAddr) -> Option<HostLocation> {
        self.entries.lock().get(host).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for HostTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_then_lookup() {
        let table = HostTable::new();
        let mac = MacAddr::new(0, 0, 0, 0, 0, 1);
        assert!(table.lookup(&mac).is_none());
        assert_eq!(table.observe(mac, 3, 1), None);
        assert_eq!(table.lookup(&mac), Some(HostLocation { dpid: 3, port: 1 }));
        // même position : pas de déplacement signalé
        assert_eq!(table.observe(mac, 3, 1), None);
    }

    #[test]
    fn last_write_wins() {
        let table = HostTable::new();
        let mac = MacAddr::new(0, 0, 0, 0, 0, 2);
        table.observe(mac, 1, 1);
        let moved = table.observe(mac, 2, 5);
        assert_eq!(moved, Some(HostLocation { dpid: 1, port: 1 }));
        assert_eq!(table.lookup(&mac), Some(HostLocation { dpid: 2, port: 5 }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn stale_entries_are_never_evicted() {
        let table = HostTable::new();
        let gone = MacAddr::new(0, 0, 0, 0, 0, 3);
        table.observe(gone, 4, 2);
        for i in 0..100u8 {
            table.observe(MacAddr::new(0, 0, 0, 0, 1, i), 1, 1);
        }
        assert_eq!(table.lookup(&gone), Some(HostLocation { dpid: 4, port: 2 }));
        assert_eq!(table.len(), 101);
    }
}
