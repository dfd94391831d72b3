/*!
Switch simulé pour développement sans plan de données

Implémente `SwitchHandle` : enregistre toutes les commandes envoyées et
peut simuler un switch qui refuse les messages.
*/

use parking_lot::Mutex;
use sdnppo_controller::switch::{MeterCommand, SwitchCommand, SwitchError, SwitchHandle, FlowRule};
use sdnppo_controller::Dpid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MockSwitch {
    dpid: Dpid,
    sent: Arc<Mutex<Vec<SwitchCommand>>>,
    failing: Arc<AtomicBool>,
}

impl MockSwitch {
    pub fn new(dpid: Dpid) -> Self {
        Self {
            dpid,
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle prêt à être enregistré auprès du contrôleur (partage l'historique).
    pub fn handle(&self) -> Arc<dyn SwitchHandle> {
        Arc::new(self.clone())
    }

    /// Tant que actif, chaque envoi échoue avec `SwitchError::Rejected`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Toutes les commandes acceptées, dans l'ordre (pour assertions de tests)
    pub fn commands(&self) -> Vec<SwitchCommand> {
        self.sent.lock().clone()
    }

    pub fn flow_mods(&self) -> Vec<FlowRule> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                SwitchCommand::FlowMod(rule) => Some(rule.clone()),
                _ => None,
            })
            .collect()
    }

    /// (commande, débit kbit/s) de chaque meter-mod reçu
    pub fn meter_mods(&self) -> Vec<(MeterCommand, u64)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                SwitchCommand::MeterMod { command, rate_kbps, .. } => Some((*command, *rate_kbps)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent.lock().iter().filter(|c| c.kind() == kind).count()
    }

    pub fn last(&self) -> Option<SwitchCommand> {
        self.sent.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl SwitchHandle for MockSwitch {
    fn dpid(&self) -> Dpid {
        self.dpid
    }

    fn send(&self, command: SwitchCommand) -> Result<(), SwitchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SwitchError::Rejected(format!("mock switch {} refuses {}", self.dpid, command.kind())));
        }
        tracing::debug!(dpid = self.dpid, command = command.kind(), "[mock] command received");
        self.sent.lock().push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_switch_records_commands() {
        let sw = MockSwitch::new(3);
        let handle = sw.handle();
        handle.send(SwitchCommand::PortStatsRequest).unwrap();
        handle.send(SwitchCommand::TableMiss { priority: 0 }).unwrap();

        assert_eq!(sw.commands().len(), 2);
        assert_eq!(sw.count("port-stats-request"), 1);
        assert_eq!(sw.last(), Some(SwitchCommand::TableMiss { priority: 0 }));
    }

    #[test]
    fn test_mock_switch_failure_toggle() {
        let sw = MockSwitch::new(4);
        sw.set_failing(true);
        assert!(matches!(sw.send(SwitchCommand::PortStatsRequest), Err(SwitchError::Rejected(_))));
        assert!(sw.commands().is_empty());

        sw.set_failing(false);
        assert!(sw.send(SwitchCommand::PortStatsRequest).is_ok());
        assert_eq!(sw.commands().len(), 1);
    }
}
