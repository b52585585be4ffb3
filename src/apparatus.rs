/* src/apparatus.rs */
//! # Apparatus Controller
//!
//! Lifecycle model of the light-source apparatus on the consumer side of the loop.
//!
//! ```text
//! Off ──power_on──▶ Standby ──▶ Ready ◀──stop_emission── Emitting
//!                                 │ ▲                       ▲
//!                        calibrate│ │                       │
//!                                 ▼ │                       │
//!                           Calibrating      Ready ──start_emission
//! any ──power_off──▶ Off            any ──fault──▶ Error
//! ```
//!
//! Optimization results are only accepted while emitting. State and power changes
//! are broadcast as [`ApparatusEvent`]s.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::boundary::ApparatusSink;
use crate::config::ApparatusLimits;
use crate::error::{LumistabError, Result};
use crate::optimizer::OptimizationResult;

const EVENT_CAPACITY: usize = 256;

/// Lifecycle state of the apparatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApparatusState {
    /// Powered down.
    Off,
    /// Powered, warming up.
    Standby,
    /// Running a calibration sequence.
    Calibrating,
    /// Ready to emit.
    Ready,
    /// Emitting light.
    Emitting,
    /// Faulted; only `power_off` is accepted.
    Error,
}

impl fmt::Display for ApparatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApparatusState::Off => "off",
            ApparatusState::Standby => "standby",
            ApparatusState::Calibrating => "calibrating",
            ApparatusState::Ready => "ready",
            ApparatusState::Emitting => "emitting",
            ApparatusState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Emission waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Constant output.
    #[default]
    Continuous,
    /// Periodic pulses.
    Pulsed,
    /// Pulse trains.
    Burst,
    /// Amplitude-modulated output.
    Modulated,
}

/// Requested emission settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionParameters {
    /// Output power in watts.
    pub power_w: f64,
    /// Emission duration in seconds; 0 means until stopped.
    pub duration_s: f64,
    /// Pulse frequency in hertz.
    pub frequency_hz: f64,
    /// Fraction of each period spent emitting.
    pub duty_cycle: f64,
    /// Waveform.
    pub mode: OutputMode,
}

impl EmissionParameters {
    /// Continuous emission at `power_w`.
    pub fn continuous(power_w: f64) -> Self {
        Self { power_w, duration_s: 0.0, frequency_hz: 0.0, duty_cycle: 1.0, mode: OutputMode::Continuous }
    }

    /// Checks the parameters against the apparatus envelope.
    pub fn validate(&self, limits: &ApparatusLimits) -> Result<()> {
        if !(self.power_w > 0.0 && self.power_w <= limits.max_power_w) {
            return Err(LumistabError::Apparatus(format!(
                "power {:.3e} W outside (0, {:.3e}] W",
                self.power_w, limits.max_power_w
            )));
        }
        if !(self.duration_s >= 0.0) {
            return Err(LumistabError::Apparatus(format!("duration must be >= 0, got {}", self.duration_s)));
        }
        if !(self.frequency_hz >= 0.0) {
            return Err(LumistabError::Apparatus(format!("frequency must be >= 0, got {}", self.frequency_hz)));
        }
        if !(self.duty_cycle > 0.0 && self.duty_cycle <= 1.0) {
            return Err(LumistabError::Apparatus(format!("duty cycle must be in (0, 1], got {}", self.duty_cycle)));
        }
        Ok(())
    }
}

/// Broadcast notification from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApparatusEvent {
    /// Lifecycle transition.
    StateChanged {
        /// Previous state.
        from: ApparatusState,
        /// New state.
        to: ApparatusState,
    },
    /// Output power changed.
    PowerChanged {
        /// New power in watts.
        power_w: f64,
    },
    /// An optimization result was applied.
    ResultApplied {
        /// Engine cycle of the result.
        cycle: u64,
        /// Fingerprint of the applied configuration.
        fingerprint: String,
    },
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApparatusStatus {
    /// Lifecycle state.
    pub state: ApparatusState,
    /// Current output power in watts.
    pub power_w: f64,
    /// Active emission settings.
    pub emission: Option<EmissionParameters>,
    /// Configured envelope.
    pub limits: ApparatusLimits,
    /// Results applied since power-on.
    pub results_applied: u64,
    /// Fingerprint of the last applied configuration.
    pub last_fingerprint: Option<String>,
    /// Symmetry score of the last applied result.
    pub last_score: Option<f64>,
}

/// Light-source lifecycle controller; the default apparatus sink.
#[derive(Debug)]
pub struct ApparatusController {
    limits: ApparatusLimits,
    state: ApparatusState,
    power_w: f64,
    emission: Option<EmissionParameters>,
    results_applied: u64,
    last_fingerprint: Option<String>,
    last_score: Option<f64>,
    events: broadcast::Sender<ApparatusEvent>,
}

impl ApparatusController {
    /// Powered-down controller.
    pub fn new(limits: ApparatusLimits) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(wavelength_nm = limits.wavelength_m * 1e9, max_power_w = limits.max_power_w, "apparatus controller initialized");
        Self {
            limits,
            state: ApparatusState::Off,
            power_w: 0.0,
            emission: None,
            results_applied: 0,
            last_fingerprint: None,
            last_score: None,
            events,
        }
    }

    /// Receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ApparatusEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ApparatusState {
        self.state
    }

    /// Snapshot of the controller.
    pub fn status(&self) -> ApparatusStatus {
        ApparatusStatus {
            state: self.state,
            power_w: self.power_w,
            emission: self.emission,
            limits: self.limits,
            results_applied: self.results_applied,
            last_fingerprint: self.last_fingerprint.clone(),
            last_score: self.last_score,
        }
    }

    fn set_state(&mut self, to: ApparatusState) {
        let from = self.state;
        if from != to {
            self.state = to;
            debug!(%from, %to, "apparatus state changed");
            // No receivers is not an error.
            let _ = self.events.send(ApparatusEvent::StateChanged { from, to });
        }
    }

    fn set_power_level(&mut self, power_w: f64) {
        self.power_w = power_w;
        let _ = self.events.send(ApparatusEvent::PowerChanged { power_w });
    }

    fn require(&self, allowed: &[ApparatusState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LumistabError::Apparatus(format!("cannot {operation} while {}", self.state)))
        }
    }

    /// Powers on and completes the warm-up: `Off → Standby → Ready`.
    pub fn power_on(&mut self) -> Result<()> {
        self.require(&[ApparatusState::Off], "power on")?;
        self.set_state(ApparatusState::Standby);
        self.set_state(ApparatusState::Ready);
        info!("apparatus ready");
        Ok(())
    }

    /// Stops any emission and powers down. Accepted from every state.
    pub fn power_off(&mut self) {
        if self.state == ApparatusState::Emitting {
            self.stop_emission();
        }
        self.set_state(ApparatusState::Off);
        self.emission = None;
        self.results_applied = 0;
        if self.power_w != 0.0 {
            self.set_power_level(0.0);
        }
        info!("apparatus powered off");
    }

    /// Runs the calibration sequence from Standby or Ready.
    pub fn calibrate(&mut self) -> Result<()> {
        self.require(&[ApparatusState::Standby, ApparatusState::Ready], "calibrate")?;
        self.set_state(ApparatusState::Calibrating);
        self.set_state(ApparatusState::Ready);
        info!("apparatus calibrated");
        Ok(())
    }

    /// Starts emitting with validated `params`.
    pub fn start_emission(&mut self, params: EmissionParameters) -> Result<()> {
        self.require(&[ApparatusState::Ready], "start emission")?;
        params.validate(&self.limits)?;
        self.emission = Some(params);
        self.set_state(ApparatusState::Emitting);
        self.set_power_level(params.power_w);
        info!(power_w = params.power_w, mode = ?params.mode, "emission started");
        Ok(())
    }

    /// Stops emission and returns to Ready. No-op unless emitting.
    pub fn stop_emission(&mut self) {
        if self.state != ApparatusState::Emitting {
            return;
        }
        self.emission = None;
        self.set_state(ApparatusState::Ready);
        self.set_power_level(0.0);
        info!("emission stopped");
    }

    /// Adjusts output power while emitting.
    pub fn set_power(&mut self, power_w: f64) -> Result<()> {
        if !(power_w >= 0.0 && power_w <= self.limits.max_power_w) {
            return Err(LumistabError::Apparatus(format!(
                "power {power_w:.3e} W outside [0, {:.3e}] W",
                self.limits.max_power_w
            )));
        }
        self.require(&[ApparatusState::Emitting], "set power")?;
        if let Some(emission) = self.emission.as_mut() {
            emission.power_w = power_w;
        }
        self.set_power_level(power_w);
        Ok(())
    }

    /// Marks the apparatus faulted.
    pub fn fault(&mut self, reason: &str) {
        warn!(reason, "apparatus fault");
        self.set_state(ApparatusState::Error);
    }
}

impl ApparatusSink for ApparatusController {
    fn apply(&mut self, result: &OptimizationResult) -> Result<()> {
        self.require(&[ApparatusState::Emitting], "apply a configuration")?;
        self.results_applied += 1;
        self.last_fingerprint = Some(result.fingerprint.clone());
        self.last_score = Some(result.score.value());
        if result.score.value() > self.limits.stability_target {
            debug!(
                cycle = result.cycle,
                score = result.score.value(),
                target = self.limits.stability_target,
                "output outside stability target"
            );
        }
        let _ = self.events.send(ApparatusEvent::ResultApplied {
            cycle: result.cycle,
            fingerprint: result.fingerprint.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ApparatusController {
        ApparatusController::new(ApparatusLimits::default())
    }

    #[test]
    fn test_lifecycle() {
        let mut apparatus = controller();
        let mut events = apparatus.subscribe();
        assert_eq!(apparatus.state(), ApparatusState::Off);
        assert!(apparatus.calibrate().is_err());

        apparatus.power_on().unwrap();
        assert_eq!(apparatus.state(), ApparatusState::Ready);
        assert!(apparatus.power_on().is_err());
        apparatus.calibrate().unwrap();

        apparatus.start_emission(EmissionParameters::continuous(2.0e-9)).unwrap();
        assert_eq!(apparatus.state(), ApparatusState::Emitting);
        apparatus.set_power(4.0e-9).unwrap();
        assert_eq!(apparatus.status().power_w, 4.0e-9);
        assert!(apparatus.set_power(1.0).is_err());

        apparatus.stop_emission();
        assert_eq!(apparatus.state(), ApparatusState::Ready);
        assert_eq!(apparatus.status().power_w, 0.0);
        apparatus.power_off();
        assert_eq!(apparatus.state(), ApparatusState::Off);

        assert_eq!(
            events.try_recv().unwrap(),
            ApparatusEvent::StateChanged { from: ApparatusState::Off, to: ApparatusState::Standby }
        );
    }

    #[test]
    fn test_emission_parameters_are_validated() {
        let limits = ApparatusLimits::default();
        assert!(EmissionParameters::continuous(5.0e-9).validate(&limits).is_ok());
        assert!(EmissionParameters::continuous(0.0).validate(&limits).is_err());
        assert!(EmissionParameters::continuous(6.0e-9).validate(&limits).is_err());
        let bad_duty = EmissionParameters { duty_cycle: 1.5, ..EmissionParameters::continuous(1.0e-9) };
        assert!(bad_duty.validate(&limits).is_err());
        let bad_duration = EmissionParameters { duration_s: -1.0, ..EmissionParameters::continuous(1.0e-9) };
        assert!(bad_duration.validate(&limits).is_err());

        let mut apparatus = controller();
        apparatus.power_on().unwrap();
        assert!(apparatus.start_emission(EmissionParameters::continuous(1.0)).is_err());
        assert_eq!(apparatus.state(), ApparatusState::Ready);
    }

    #[test]
    fn test_fault_blocks_everything_but_power_off() {
        let mut apparatus = controller();
        apparatus.power_on().unwrap();
        apparatus.fault("sensor drift");
        assert!(apparatus.calibrate().is_err());
        assert!(apparatus.start_emission(EmissionParameters::continuous(1.0e-9)).is_err());
        apparatus.power_off();
        assert!(apparatus.power_on().is_ok());
    }
}
