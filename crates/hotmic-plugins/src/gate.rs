//! Noise gate for silencing signals below a threshold.
//!
//! A gate attenuates signal that falls below a threshold level, removing
//! room noise and bleed between phrases. Smooth attack/release transitions
//! and a hold time prevent rapid gate chatter.

use libm::powf;
use serde::{Deserialize, Serialize};

use hotmic_core::context::ProcessContext;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::Plugin;

const PARAMS: [ParamDescriptor; 4] = [
    ParamDescriptor::gain_db("Threshold", -80.0, 0.0, -40.0),
    ParamDescriptor::time_ms("Attack", 0.1, 50.0, 1.0),
    ParamDescriptor::time_ms("Release", 10.0, 1000.0, 100.0),
    ParamDescriptor::time_ms("Hold", 0.0, 500.0, 50.0),
];

/// Gate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Opening,
    Open,
    Holding,
    Closing,
}

/// State persisted across sessions beyond the parameter table.
#[derive(Debug, Serialize, Deserialize)]
struct GateBlob {
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    hold_ms: f32,
}

/// Noise gate with attack/hold/release ballistics.
#[derive(Debug)]
pub struct GatePlugin {
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    hold_ms: f32,

    /// Envelope follower state (fast attack, slower release one-pole).
    envelope: f32,
    env_attack_coeff: f32,
    env_release_coeff: f32,

    state: GateState,
    /// Current gain (0 = closed, 1 = open).
    gain: f32,
    hold_counter: u32,
    attack_inc: f32,
    release_dec: f32,

    sample_rate: f32,
}

impl GatePlugin {
    /// Create a gate with default settings.
    pub fn new() -> Self {
        let mut gate = Self {
            threshold_db: PARAMS[0].default,
            attack_ms: PARAMS[1].default,
            release_ms: PARAMS[2].default,
            hold_ms: PARAMS[3].default,
            envelope: 0.0,
            env_attack_coeff: 0.0,
            env_release_coeff: 0.0,
            state: GateState::Closed,
            gain: 0.0,
            hold_counter: 0,
            attack_inc: 0.0,
            release_dec: 0.0,
            sample_rate: 48000.0,
        };
        gate.recalculate();
        gate
    }

    fn db_to_linear(db: f32) -> f32 {
        powf(10.0, db / 20.0)
    }

    fn one_pole_coeff(time_ms: f32, sample_rate: f32) -> f32 {
        let samples = (time_ms * 0.001 * sample_rate).max(1.0);
        1.0 - libm::expf(-1.0 / samples)
    }

    fn recalculate(&mut self) {
        self.env_attack_coeff = Self::one_pole_coeff(0.1, self.sample_rate);
        self.env_release_coeff = Self::one_pole_coeff(20.0, self.sample_rate);

        let attack_samples = self.attack_ms / 1000.0 * self.sample_rate;
        let release_samples = self.release_ms / 1000.0 * self.sample_rate;
        self.attack_inc = if attack_samples > 0.0 {
            1.0 / attack_samples
        } else {
            1.0
        };
        self.release_dec = if release_samples > 0.0 {
            1.0 / release_samples
        } else {
            1.0
        };
    }

    #[inline]
    fn advance(&mut self, input: f32, threshold_linear: f32, hold_samples: u32) -> f32 {
        // Envelope detection.
        let rectified = input.abs();
        let coeff = if rectified > self.envelope {
            self.env_attack_coeff
        } else {
            self.env_release_coeff
        };
        self.envelope += coeff * (rectified - self.envelope);

        let above = self.envelope > threshold_linear;

        match self.state {
            GateState::Closed => {
                if above {
                    self.state = GateState::Opening;
                }
            }
            GateState::Opening => {
                self.gain += self.attack_inc;
                if self.gain >= 1.0 {
                    self.gain = 1.0;
                    self.state = GateState::Open;
                }
                if !above {
                    self.state = GateState::Closing;
                }
            }
            GateState::Open => {
                if !above {
                    self.hold_counter = hold_samples;
                    self.state = GateState::Holding;
                }
            }
            GateState::Holding => {
                if above {
                    self.state = GateState::Open;
                } else if self.hold_counter > 0 {
                    self.hold_counter -= 1;
                } else {
                    self.state = GateState::Closing;
                }
            }
            GateState::Closing => {
                self.gain -= self.release_dec;
                if self.gain <= 0.0 {
                    self.gain = 0.0;
                    self.state = GateState::Closed;
                }
                if above {
                    self.state = GateState::Opening;
                }
            }
        }

        input * self.gain
    }
}

impl Default for GatePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for GatePlugin {
    fn id(&self) -> &'static str {
        "gate"
    }

    fn name(&self) -> &'static str {
        "Noise Gate"
    }

    fn initialize(&mut self, sample_rate: f32, _block_size: usize) {
        self.sample_rate = sample_rate;
        self.recalculate();
        self.reset();
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.gain = 0.0;
        self.hold_counter = 0;
        self.state = GateState::Closed;
    }

    fn process(&mut self, buffer: &mut [f32], _ctx: &mut ProcessContext<'_>) {
        let threshold_linear = Self::db_to_linear(self.threshold_db);
        let hold_samples = (self.hold_ms / 1000.0 * self.sample_rate) as u32;
        for s in buffer.iter_mut() {
            *s = self.advance(*s, threshold_linear, hold_samples);
        }
    }

    fn param_count(&self) -> usize {
        PARAMS.len()
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        PARAMS.get(index).copied()
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.threshold_db,
            1 => self.attack_ms,
            2 => self.release_ms,
            3 => self.hold_ms,
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        let Some(desc) = PARAMS.get(index) else {
            return;
        };
        let value = desc.clamp(value);
        match index {
            0 => self.threshold_db = value,
            1 => self.attack_ms = value,
            2 => self.release_ms = value,
            3 => self.hold_ms = value,
            _ => {}
        }
        self.recalculate();
    }

    fn save_state(&self) -> Vec<u8> {
        serde_json::to_vec(&GateBlob {
            threshold_db: self.threshold_db,
            attack_ms: self.attack_ms,
            release_ms: self.release_ms,
            hold_ms: self.hold_ms,
        })
        .unwrap_or_default()
    }

    fn load_state(&mut self, bytes: &[u8]) {
        if let Ok(blob) = serde_json::from_slice::<GateBlob>(bytes) {
            self.set_param(0, blob.threshold_db);
            self.set_param(1, blob.attack_ms);
            self.set_param(2, blob.release_ms);
            self.set_param(3, blob.hold_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::bus::SignalBus;
    use hotmic_core::context::RoutingContext;
    use hotmic_core::signal::{ProducerMap, SignalMask};

    fn ctx<'a>(routing: &'a RoutingContext, bus: &'a SignalBus) -> ProcessContext<'a> {
        ProcessContext {
            sample_rate: 48000.0,
            block_size: 256,
            sample_clock: 0,
            sample_time: 0,
            slot_index: 0,
            cumulative_latency: 0,
            channel_id: 0,
            routing,
            bus,
            producer_map: ProducerMap::empty(),
            producer_lane: None,
            allowed_mask: SignalMask::EMPTY,
            requested_mask: SignalMask::EMPTY,
            wants_capture: false,
        }
    }

    #[test]
    fn quiet_signal_is_gated() {
        let routing = RoutingContext::new();
        let bus = SignalBus::new(0, 0, 64);
        let mut gate = GatePlugin::new();
        gate.initialize(48000.0, 256);
        gate.set_param(0, -40.0);

        // -60 dB signal stays under the threshold.
        let mut buf = vec![0.001_f32; 4800];
        gate.process(&mut buf, &mut ctx(&routing, &bus));
        let tail_energy: f32 = buf[4000..].iter().map(|s| s * s).sum();
        assert!(tail_energy < 1e-9, "gate leaked: {tail_energy}");
    }

    #[test]
    fn loud_signal_opens_the_gate() {
        let routing = RoutingContext::new();
        let bus = SignalBus::new(0, 0, 64);
        let mut gate = GatePlugin::new();
        gate.initialize(48000.0, 256);
        gate.set_param(0, -40.0);
        gate.set_param(1, 0.5);

        let mut buf = vec![0.5_f32; 4800];
        gate.process(&mut buf, &mut ctx(&routing, &bus));
        // After the attack ramp the signal passes at full level.
        assert!((buf[4799] - 0.5).abs() < 0.01, "got {}", buf[4799]);
    }

    #[test]
    fn state_blob_roundtrip() {
        let mut gate = GatePlugin::new();
        gate.set_param(0, -55.0);
        gate.set_param(2, 250.0);
        let blob = gate.save_state();

        let mut restored = GatePlugin::new();
        restored.load_state(&blob);
        assert_eq!(restored.get_param(0), -55.0);
        assert_eq!(restored.get_param(2), 250.0);
    }

    #[test]
    fn malformed_state_is_ignored() {
        let mut gate = GatePlugin::new();
        let before = gate.get_param(0);
        gate.load_state(b"not json");
        assert_eq!(gate.get_param(0), before);
    }
}
