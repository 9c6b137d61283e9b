//! Active liveness detection.
//!
//! A printed photograph held up to the camera cannot blink. The blink
//! variant watches the per-frame eye aspect ratio and confirms liveness on
//! the *reopening* edge that follows a sustained closure: a single blurry
//! frame misread as "closed" never confirms, while a genuine
//! closure-then-reopening confirms on the first open frame after it.
//!
//! The gesture variant is a single-frame thumbs-up check on a still image.
//! Both variants report a [`LivenessOutcome`] so the verification pipeline
//! treats them uniformly.
//!
//! # Threat Coverage
//!
//! - **Blocks:** static printed photographs, a still image on a screen.
//! - **Does not block:** video replay of a blinking subject, masks with
//!   cut-out eyes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::detect_thumbs_up;
use crate::types::{EyeSignal, HandLandmarks};

/// Default EAR below which an eye counts as closed.
pub const DEFAULT_CLOSED_THRESHOLD: f32 = 0.20;
/// Default number of consecutive closed frames that make a blink.
pub const DEFAULT_MIN_CLOSED_FRAMES: u32 = 2;

/// What a frame without a usable face does to an in-progress closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissPolicy {
    /// The frame is dropped; the closed-frame counter is left untouched.
    #[default]
    Ignore,
    /// The frame breaks the closure; the counter returns to zero.
    Reset,
    /// The frame is assumed to continue the closure; the counter advances.
    CountClosed,
}

impl std::str::FromStr for MissPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reset" => Ok(Self::Reset),
            "count-closed" | "count_closed" => Ok(Self::CountClosed),
            other => Err(format!(
                "unknown miss policy '{other}' (expected ignore, reset or count-closed)"
            )),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlinkConfigError {
    #[error("closed threshold must be a positive finite number, got {0}")]
    Threshold(f32),
    #[error("minimum consecutive closed frames must be at least 1")]
    MinClosedFrames,
}

/// Blink state machine parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkConfig {
    /// EAR below which an eye counts as closed.
    pub closed_threshold: f32,
    /// Closed frames required before a reopening confirms a blink.
    pub min_consecutive_closed_frames: u32,
    pub miss_policy: MissPolicy,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            min_consecutive_closed_frames: DEFAULT_MIN_CLOSED_FRAMES,
            miss_policy: MissPolicy::Ignore,
        }
    }
}

impl BlinkConfig {
    pub fn validate(&self) -> Result<(), BlinkConfigError> {
        if !self.closed_threshold.is_finite() || self.closed_threshold <= 0.0 {
            return Err(BlinkConfigError::Threshold(self.closed_threshold));
        }
        if self.min_consecutive_closed_frames == 0 {
            return Err(BlinkConfigError::MinClosedFrames);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    Watching,
    BlinkConfirmed,
}

/// State of one blink session. `F` is whatever the caller uses as frame
/// evidence; it is stored only for the confirming frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessState<F> {
    pub closed_frames: u32,
    pub confirming_frame: Option<F>,
}

impl<F> Default for LivenessState<F> {
    fn default() -> Self {
        Self {
            closed_frames: 0,
            confirming_frame: None,
        }
    }
}

impl<F> LivenessState<F> {
    pub fn phase(&self) -> BlinkPhase {
        if self.confirming_frame.is_some() {
            BlinkPhase::BlinkConfirmed
        } else {
            BlinkPhase::Watching
        }
    }
}

/// Advance the blink state machine by one frame.
///
/// Terminal once confirmed: later frames leave the state untouched.
pub fn step<F>(
    config: &BlinkConfig,
    mut state: LivenessState<F>,
    signal: EyeSignal,
    frame: F,
) -> LivenessState<F> {
    if state.phase() == BlinkPhase::BlinkConfirmed {
        return state;
    }

    match signal {
        EyeSignal::Missing => match config.miss_policy {
            MissPolicy::Ignore => {}
            MissPolicy::Reset => state.closed_frames = 0,
            MissPolicy::CountClosed => state.closed_frames = state.closed_frames.saturating_add(1),
        },
        EyeSignal::Openness(ear) if ear < config.closed_threshold => {
            state.closed_frames = state.closed_frames.saturating_add(1);
        }
        EyeSignal::Openness(_) => {
            if state.closed_frames >= config.min_consecutive_closed_frames {
                state.confirming_frame = Some(frame);
            } else {
                state.closed_frames = 0;
            }
        }
    }

    state
}

/// Result of either liveness variant.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessOutcome<F> {
    pub confirmed: bool,
    /// Frame that confirmed liveness, if any.
    pub evidence: Option<F>,
}

impl<F> LivenessOutcome<F> {
    pub fn rejected() -> Self {
        Self {
            confirmed: false,
            evidence: None,
        }
    }

    pub fn confirmed(evidence: F) -> Self {
        Self {
            confirmed: true,
            evidence: Some(evidence),
        }
    }
}

/// Owning wrapper around [`step`] for frame loops.
#[derive(Debug)]
pub struct BlinkDetector<F> {
    config: BlinkConfig,
    state: LivenessState<F>,
}

impl<F> BlinkDetector<F> {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            state: LivenessState::default(),
        }
    }

    /// Feed one frame. Returns the phase after the transition.
    pub fn observe(&mut self, signal: EyeSignal, frame: F) -> BlinkPhase {
        let state = std::mem::take(&mut self.state);
        self.state = step(&self.config, state, signal, frame);
        self.state.phase()
    }

    pub fn closed_frames(&self) -> u32 {
        self.state.closed_frames
    }

    pub fn into_outcome(self) -> LivenessOutcome<F> {
        match self.state.confirming_frame {
            Some(frame) => LivenessOutcome::confirmed(frame),
            None => LivenessOutcome::rejected(),
        }
    }
}

pub mod gesture {
    //! Single-frame thumbs-up liveness.

    use super::*;

    /// Confirm liveness when the hand shows a thumbs-up. A missing hand
    /// never confirms.
    pub fn evaluate<F>(hand: Option<&HandLandmarks>, frame: F) -> LivenessOutcome<F> {
        match hand {
            Some(hand) if detect_thumbs_up(hand) => LivenessOutcome::confirmed(frame),
            _ => LivenessOutcome::rejected(),
        }
    }
}
