/**
 * RATE-LIMIT MANAGER - Propriétaire unique de la valeur de contrôle `u`
 *
 * RÔLE :
 * Convertit u ∈ [0,1] en débit de meter (kbit/s) par interpolation linéaire
 * dans [rate_min, rate_max], puis (ré)installe le meter sur chaque switch connecté.
 *
 * FONCTIONNEMENT :
 * - Un seul meter (id fixe), bande drop-on-exceed, burst = max(1, rate/10)
 * - ADD si jamais installé sur le switch, MODIFY sinon
 * - Un switch qui refuse n'empêche ni les autres ni l'enregistrement de l'état voulu
 */

use crate::config::{ControllerConfig, METER_ID};
use crate::models::Dpid;
use crate::state::{new_state, Shared};
use crate::switch::{dispatch, CommandOutcome, MeterCommand, SwitchCommand, SwitchHandle, SwitchRegistry};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Valeur appliquée quand aucune valeur exploitable n'est fournie
pub const DEFAULT_CONTROL: f64 = 0.5;

/// Ramène u dans [0,1]; NaN => valeur par défaut.
pub fn clamp_control(u: f64) -> f64 {
    if u.is_nan() {
        return DEFAULT_CONTROL;
    }
    u.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateMapping {
    pub min_kbps: u64,
    pub max_kbps: u64,
}

impl RateMapping {
    /// `min + u*(max-min)`, tronqué à l'entier.
    pub fn rate_for(&self, u: f64) -> u64 {
        let u = clamp_control(u);
        let span = self.max_kbps.saturating_sub(self.min_kbps) as f64;
        (self.min_kbps as f64 + u * span) as u64
    }
}

pub fn burst_for(rate_kbps: u64) -> u64 {
    (rate_kbps / 10).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    pub u: f64,
    pub meter_kbps: u64,
}

/// Résultat d'un set_control : état retenu + résultat par switch.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlUpdate {
    pub state: ControlState,
    pub pushes: Vec<(Dpid, CommandOutcome)>,
}

#[derive(Debug)]
struct LimiterState {
    control: ControlState,
    installed: HashSet<Dpid>,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    mapping: RateMapping,
    meter_id: u32,
    registry: SwitchRegistry,
    inner: Shared<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &ControllerConfig, registry: SwitchRegistry) -> Self {
        let mapping = RateMapping { min_kbps: config.rate_min_kbps, max_kbps: config.rate_max_kbps };
        let control = ControlState { u: DEFAULT_CONTROL, meter_kbps: mapping.rate_for(DEFAULT_CONTROL) };
        Self {
            mapping,
            meter_id: METER_ID,
            registry,
            inner: new_state(LimiterState { control, installed: HashSet::new() }),
        }
    }

    pub fn meter_id(&self) -> u32 {
        self.meter_id
    }

    pub fn mapping(&self) -> RateMapping {
        self.mapping
    }

    pub fn control(&self) -> ControlState {
        self.inner.lock().control
    }

    /// Enregistre la nouvelle valeur puis pousse le meter sur tous les switches connectés.
    pub fn set_control(&self, u: f64) -> ControlUpdate {
        let u = clamp_control(u);
        let control = ControlState { u, meter_kbps: self.mapping.rate_for(u) };
        let switches = self.registry.all();

        // verrou tenu pendant les envois (non bloquants) : l'ordre ADD/MODIFY
        // reste cohérent avec un ensure_installed concurrent
        let mut inner = self.inner.lock();
        inner.control = control;
        let pushes = switches
            .iter()
            .map(|sw| (sw.dpid(), self.push(&mut inner, sw.as_ref())))
            .collect::<Vec<_>>();
        drop(inner);

        let failed = pushes.iter().filter(|(_, o)| !o.is_sent()).count();
        info!(u, meter_kbps = control.meter_kbps, switches = pushes.len(), failed, "control value updated");
        ControlUpdate { state: control, pushes }
    }

    /// Idempotent : crée le meter si absent, le modifie sinon, au débit courant.
    pub fn ensure_installed(&self, switch: &dyn SwitchHandle) -> CommandOutcome {
        let mut inner = self.inner.lock();
        self.push(&mut inner, switch)
    }

    fn push(&self, inner: &mut LimiterState, switch: &dyn SwitchHandle) -> CommandOutcome {
        let dpid = switch.dpid();
        let command = if inner.installed.contains(&dpid) { MeterCommand::Modify } else { MeterCommand::Add };
        let rate = inner.control.meter_kbps;
        let outcome = dispatch(
            switch,
            SwitchCommand::MeterMod { command, meter_id: self.meter_id, rate_kbps: rate, burst_size: burst_for(rate) },
        );
        if outcome.is_sent() {
            inner.installed.insert(dpid);
            debug!(dpid, ?command, rate_kbps = rate, "meter pushed");
        }
        outcome
    }

    /// Switch déconnecté : on oublie son marqueur, la reconnexion refera un ADD.
    pub fn forget(&self, dpid: Dpid) -> bool {
        self.inner.lock().installed.remove(&dpid)
    }

    pub fn is_installed(&self, dpid: Dpid) -> bool {
        self.inner.lock().installed.contains(&dpid)
    }

    pub fn installed_count(&self) -> usize {
        self.inner.lock().installed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::{AddressedCommand, ChannelSwitch, SwitchError};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Debug)]
    struct RejectingSwitch(Dpid);

    impl SwitchHandle for RejectingSwitch {
        fn dpid(&self) -> Dpid {
            self.0
        }
        fn send(&self, _command: SwitchCommand) -> Result<(), SwitchError> {
            Err(SwitchError::Rejected("meter table full".into()))
        }
    }

    fn limiter() -> (RateLimiter, SwitchRegistry) {
        let registry = SwitchRegistry::new();
        (RateLimiter::new(&ControllerConfig::default(), registry.clone()), registry)
    }

    fn meter_mods(rx: &mut UnboundedReceiver<AddressedCommand>) -> Vec<(MeterCommand, u64, u64)> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let SwitchCommand::MeterMod { command, rate_kbps, burst_size, .. } = cmd.command {
                out.push((command, rate_kbps, burst_size));
            }
        }
        out
    }

    #[test]
    fn default_is_mid_range() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.control(), ControlState { u: 0.5, meter_kbps: 11000 });
    }

    #[test]
    fn mapping_is_monotonic_and_clamped() {
        let mapping = RateMapping { min_kbps: 2000, max_kbps: 20000 };
        assert_eq!(mapping.rate_for(-1.0), mapping.rate_for(0.0));
        assert_eq!(mapping.rate_for(2.0), mapping.rate_for(1.0));
        assert_eq!(mapping.rate_for(0.0), 2000);
        assert_eq!(mapping.rate_for(1.0), 20000);
        let mut last = 0;
        for i in 0..=100 {
            let rate = mapping.rate_for(i as f64 / 100.0);
            assert!(rate >= last);
            last = rate;
        }
    }

    #[test]
    fn set_control_is_idempotent_in_rate() {
        let (limiter, _) = limiter();
        let a = limiter.set_control(0.3).state;
        let b = limiter.set_control(0.3).state;
        assert_eq!(a, b);
        assert_eq!(limiter.set_control(-1.0).state, limiter.set_control(0.0).state);
        assert_eq!(limiter.set_control(2.0).state.u, 1.0);
        assert_eq!(limiter.set_control(f64::NAN).state.u, DEFAULT_CONTROL);
    }

    #[test]
    fn add_then_modify() {
        let (limiter, registry) = limiter();
        let (sw, mut rx) = ChannelSwitch::pair(1);
        registry.connect(Arc::new(sw.clone()));

        assert!(limiter.ensure_installed(&sw).is_sent());
        assert!(limiter.ensure_installed(&sw).is_sent());
        limiter.set_control(1.0);
        assert_eq!(
            meter_mods(&mut rx),
            vec![
                (MeterCommand::Add, 11000, 1100),
                (MeterCommand::Modify, 11000, 1100),
                (MeterCommand::Modify, 20000, 2000),
            ]
        );
        assert!(limiter.forget(1));
        limiter.ensure_installed(&sw);
        assert_eq!(meter_mods(&mut rx), vec![(MeterCommand::Add, 20000, 2000)]);
    }

    #[test]
    fn one_rejecting_switch_does_not_block_others() {
        let (limiter, registry) = limiter();
        let (good, mut rx) = ChannelSwitch::pair(2);
        registry.connect(Arc::new(RejectingSwitch(1)));
        registry.connect(Arc::new(good));

        let update = limiter.set_control(0.0);
        assert_eq!(update.state, ControlState { u: 0.0, meter_kbps: 2000 });
        assert_eq!(update.pushes.len(), 2);
        assert!(matches!(update.pushes[0], (1, CommandOutcome::Failed(_))));
        assert_eq!(update.pushes[1], (2, CommandOutcome::Sent));
        assert_eq!(meter_mods(&mut rx), vec![(MeterCommand::Add, 2000, 200)]);
        // l'état voulu est conservé malgré l'échec
        assert_eq!(limiter.control().meter_kbps, 2000);
        assert!(!limiter.is_installed(1));
        assert!(limiter.is_installed(2));
    }

    #[test]
    fn burst_has_floor_of_one() {
        assert_eq!(burst_for(5), 1);
        assert_eq!(burst_for(0), 1);
        assert_eq!(burst_for(11000), 1100);
    }
}
