//! The parameter bridge: UI → audio, lock-free.
//!
//! Target paths are strings at the UI edge (`channel0.input_gain`,
//! `channel1.plugin.7.2`, `master.mute`), parsed once into a small Copy
//! [`ParamTarget`] tag. The audio thread dispatches on the tag; no string
//! ever crosses the boundary. Delivery is a bounded SPSC ring: the sender
//! spins briefly on a full queue, then drops and counts.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use thiserror::Error;

use crate::diag::EngineDiagnostics;

/// Bridge capacity in pending changes.
const BRIDGE_CAPACITY: usize = 1024;
/// How many times the sender retries before dropping.
const FULL_RETRIES: usize = 64;

/// Pre-resolved parameter destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTarget {
    /// `channel{N}.input_gain`
    ChannelInputGain {
        /// Channel id.
        channel: usize,
    },
    /// `channel{N}.output_gain`
    ChannelOutputGain {
        /// Channel id.
        channel: usize,
    },
    /// `channel{N}.mute`
    ChannelMute {
        /// Channel id.
        channel: usize,
    },
    /// `channel{N}.solo`
    ChannelSolo {
        /// Channel id.
        channel: usize,
    },
    /// `channel{N}.plugin.{instance_id}.{param_index}`
    PluginParam {
        /// Channel id.
        channel: usize,
        /// Plugin instance id.
        instance_id: u64,
        /// Parameter index within the plugin.
        param_index: usize,
    },
    /// `channel{N}.container.{container_id}.bypass`
    ContainerBypass {
        /// Channel id.
        channel: usize,
        /// Container id.
        container_id: u64,
    },
    /// `master.mute`
    MasterMute,
    /// `master.stereo`
    MasterStereo,
}

/// One queued parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamChange {
    /// Destination.
    pub target: ParamTarget,
    /// New value. Toggles treat >= 0.5 as true.
    pub value: f32,
    /// Sample clock at submission time.
    pub clock: u64,
}

/// Why a target path failed to parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    /// The path has the wrong shape.
    #[error("malformed parameter path: '{0}'")]
    Malformed(String),
    /// A numeric segment did not parse.
    #[error("bad number in parameter path: '{0}'")]
    BadNumber(String),
}

/// Parse a target path.
///
/// Case-insensitive; `.` and `:` are interchangeable separators.
pub fn parse_target(path: &str) -> Result<ParamTarget, TargetParseError> {
    let lower = path.to_ascii_lowercase();
    let parts: Vec<&str> = lower.split(['.', ':']).collect();
    let malformed = || TargetParseError::Malformed(path.to_string());
    let bad_number = || TargetParseError::BadNumber(path.to_string());

    match parts.as_slice() {
        ["master", "mute"] => Ok(ParamTarget::MasterMute),
        ["master", "stereo"] => Ok(ParamTarget::MasterStereo),
        [head, rest @ ..] if head.starts_with("channel") => {
            let channel: usize = head["channel".len()..].parse().map_err(|_| bad_number())?;
            match rest {
                ["input_gain"] => Ok(ParamTarget::ChannelInputGain { channel }),
                ["output_gain"] => Ok(ParamTarget::ChannelOutputGain { channel }),
                ["mute"] => Ok(ParamTarget::ChannelMute { channel }),
                ["solo"] => Ok(ParamTarget::ChannelSolo { channel }),
                ["plugin", instance, param] => {
                    let instance_id: u64 = instance.parse().map_err(|_| bad_number())?;
                    let param_index: usize = param.parse().map_err(|_| bad_number())?;
                    Ok(ParamTarget::PluginParam {
                        channel,
                        instance_id,
                        param_index,
                    })
                }
                ["container", container, "bypass"] => {
                    let container_id: u64 = container.parse().map_err(|_| bad_number())?;
                    Ok(ParamTarget::ContainerBypass {
                        channel,
                        container_id,
                    })
                }
                _ => Err(malformed()),
            }
        }
        _ => Err(malformed()),
    }
}

/// UI half of the bridge.
pub struct ParamSender {
    producer: Producer<ParamChange>,
    diag: Arc<EngineDiagnostics>,
}

/// Audio half of the bridge.
pub struct ParamReceiver {
    consumer: Consumer<ParamChange>,
}

/// Create a connected bridge pair.
pub fn param_bridge(diag: Arc<EngineDiagnostics>) -> (ParamSender, ParamReceiver) {
    let (producer, consumer) = RingBuffer::new(BRIDGE_CAPACITY);
    (
        ParamSender { producer, diag },
        ParamReceiver { consumer },
    )
}

impl ParamSender {
    /// Queue a change; spins briefly on a full ring, then drops (counted).
    ///
    /// Returns false when the change was dropped.
    pub fn send(&mut self, change: ParamChange) -> bool {
        for _ in 0..FULL_RETRIES {
            if self.producer.push(change).is_ok() {
                return true;
            }
            std::hint::spin_loop();
        }
        self.diag.record_param_drop();
        false
    }
}

impl ParamReceiver {
    /// Pop the next pending change, if any. Audio thread; wait-free.
    #[inline]
    pub fn pop(&mut self) -> Option<ParamChange> {
        self.consumer.pop().ok()
    }
}
