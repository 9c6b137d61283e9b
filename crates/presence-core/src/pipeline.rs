//! Two-stage verification: liveness and identity, fused into one decision.
//!
//! Live capture proves presence first and only then spends a face-embedding
//! comparison on the confirming frame. Static-pair mode runs the identity
//! match first and checks the gesture only for a matching probe. The order
//! decides which failure is reported, so each mode keeps its own.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::collaborator::{ArtifactSink, FaceMatcher, FrameSource, LandmarkExtractor, MatchError};
use crate::geometry::face_eye_signal;
use crate::liveness::{gesture, BlinkConfig, BlinkConfigError, BlinkDetector, BlinkPhase};
use crate::types::{EyeSignal, Frame};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid blink configuration: {0}")]
    Config(#[from] BlinkConfigError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub blink: BlinkConfig,
    /// Upper bound on the live-capture wait. `None` waits until the stream
    /// ends or the operator quits.
    pub max_wait: Option<Duration>,
}

/// Operator abort signal, checked at every frame boundary.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run acquires its liveness evidence.
pub enum Mode<'a> {
    /// Blink detection over a frame stream, then identity on the confirming frame.
    LiveCapture(&'a mut dyn FrameSource),
    /// Identity on a still probe, then the thumbs-up gesture on the same probe.
    StaticPair { probe: Frame },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    LiveCapture,
    StaticPair,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::LiveCapture => f.write_str("live-capture"),
            ModeKind::StaticPair => f.write_str("static-pair"),
        }
    }
}

/// The fused decision. `accepted` is always `liveness && identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    liveness: bool,
    identity: bool,
    accepted: bool,
}

impl VerificationResult {
    pub fn new(liveness: bool, identity: bool) -> Self {
        Self {
            liveness,
            identity,
            accepted: liveness && identity,
        }
    }

    pub fn liveness(&self) -> bool {
        self.liveness
    }

    pub fn identity(&self) -> bool {
        self.identity
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }
}

/// Which stage failed, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The stream ended without a blink.
    NoBlink { frames_processed: u64 },
    /// The operator quit before liveness was confirmed.
    OperatorAbort,
    /// The configured wait limit elapsed before a blink.
    TimedOut { limit_secs: f64 },
    /// No hand was found in the probe image.
    NoHand,
    /// A hand was found but it was not a thumbs-up.
    NoGesture,
    /// The landmark model failed on the probe image.
    LandmarkFailure { message: String },
    /// Both faces were found but they belong to different people.
    IdentityMismatch { distance: f32 },
    /// The matcher could not find a face in one of the images.
    NoFaceDetected { message: String },
    /// The matcher itself failed.
    MatcherFailure { message: String },
}

impl RejectionReason {
    /// Stage the rejection belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            RejectionReason::NoBlink { .. }
            | RejectionReason::OperatorAbort
            | RejectionReason::TimedOut { .. }
            | RejectionReason::NoHand
            | RejectionReason::NoGesture
            | RejectionReason::LandmarkFailure { .. } => "liveness",
            RejectionReason::IdentityMismatch { .. }
            | RejectionReason::NoFaceDetected { .. }
            | RejectionReason::MatcherFailure { .. } => "identity",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NoBlink { frames_processed } => {
                write!(f, "no blink detected in {frames_processed} frame(s)")
            }
            RejectionReason::OperatorAbort => f.write_str("aborted by operator"),
            RejectionReason::TimedOut { limit_secs } => {
                write!(f, "no blink within {limit_secs:.1}s")
            }
            RejectionReason::NoHand => f.write_str("no hand detected in probe image"),
            RejectionReason::NoGesture => f.write_str("thumbs-up gesture not detected"),
            RejectionReason::LandmarkFailure { message } => {
                write!(f, "landmark extraction failed: {message}")
            }
            RejectionReason::IdentityMismatch { distance } => {
                write!(f, "faces do not match (distance {distance:.4})")
            }
            RejectionReason::NoFaceDetected { message } => write!(f, "no face detected: {message}"),
            RejectionReason::MatcherFailure { message } => {
                write!(f, "face matcher failed: {message}")
            }
        }
    }
}

/// Everything a run decided, for the operator and the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub mode: ModeKind,
    pub result: VerificationResult,
    pub rejection: Option<RejectionReason>,
    /// Embedding distance, when the identity stage ran and produced one.
    pub distance: Option<f32>,
    /// Index of the frame that confirmed liveness.
    pub confirming_frame: Option<u64>,
    pub frames_processed: u64,
    /// Where the confirming frame was persisted, if it was.
    pub artifact: Option<PathBuf>,
}

impl VerificationReport {
    fn new(mode: ModeKind) -> Self {
        Self {
            mode,
            result: VerificationResult::new(false, false),
            rejection: None,
            distance: None,
            confirming_frame: None,
            frames_processed: 0,
            artifact: None,
        }
    }

    pub fn accepted(&self) -> bool {
        self.result.accepted()
    }
}

struct IdentityCheck {
    matched: bool,
    distance: Option<f32>,
    failure: Option<RejectionReason>,
}

/// Orchestrates one verification run over injected collaborators.
pub struct VerificationPipeline<L, M> {
    landmarks: L,
    matcher: M,
    config: PipelineConfig,
    artifacts: Option<Box<dyn ArtifactSink + Send>>,
    quit: QuitFlag,
}

impl<L: LandmarkExtractor, M: FaceMatcher> VerificationPipeline<L, M> {
    pub fn new(landmarks: L, matcher: M, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.blink.validate()?;
        Ok(Self {
            landmarks,
            matcher,
            config,
            artifacts: None,
            quit: QuitFlag::new(),
        })
    }

    /// Persist confirming frames through `sink`. Failures are logged only.
    pub fn with_artifact_sink(mut self, sink: Box<dyn ArtifactSink + Send>) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn with_quit_flag(mut self, quit: QuitFlag) -> Self {
        self.quit = quit;
        self
    }

    pub fn run(&mut self, mode: Mode<'_>, reference: &Frame) -> VerificationReport {
        let report = match mode {
            Mode::LiveCapture(source) => self.run_live(source, reference),
            Mode::StaticPair { probe } => self.run_static_pair(reference, probe),
        };

        match &report.rejection {
            None => tracing::info!(mode = %report.mode, "verification accepted"),
            Some(reason) => tracing::info!(
                mode = %report.mode,
                stage = reason.stage(),
                reason = %reason,
                liveness = report.result.liveness(),
                identity = report.result.identity(),
                "verification rejected"
            ),
        }
        report
    }

    fn run_live(&mut self, source: &mut dyn FrameSource, reference: &Frame) -> VerificationReport {
        let mut report = VerificationReport::new(ModeKind::LiveCapture);
        let mut detector = BlinkDetector::new(self.config.blink);
        let started = Instant::now();
        let mut skipped_reads = 0u64;

        let stopped = loop {
            if self.quit.is_raised() {
                break Some(RejectionReason::OperatorAbort);
            }
            if let Some(limit) = self.config.max_wait {
                if started.elapsed() >= limit {
                    break Some(RejectionReason::TimedOut {
                        limit_secs: limit.as_secs_f64(),
                    });
                }
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    break Some(RejectionReason::NoBlink {
                        frames_processed: report.frames_processed,
                    })
                }
                Err(e) => {
                    skipped_reads += 1;
                    tracing::debug!(error = %e, skipped_reads, "ignoring empty camera frame");
                    continue;
                }
            };
            report.frames_processed += 1;

            let signal = match self.landmarks.face_landmarks(&frame) {
                Ok(Some(face)) => face_eye_signal(&face),
                Ok(None) => EyeSignal::Missing,
                Err(e) => {
                    tracing::warn!(frame = frame.index, error = %e, "landmark extraction failed");
                    EyeSignal::Missing
                }
            };
            tracing::trace!(
                frame = frame.index,
                ?signal,
                closed_frames = detector.closed_frames(),
                "blink step"
            );

            if detector.observe(signal, frame) == BlinkPhase::BlinkConfirmed {
                break None;
            }
        };

        let Some(confirming) = detector.into_outcome().evidence else {
            report.rejection = stopped.or(Some(RejectionReason::NoBlink {
                frames_processed: report.frames_processed,
            }));
            return report;
        };

        tracing::info!(
            frame = confirming.index,
            frames_processed = report.frames_processed,
            skipped_reads,
            "liveness verified: blink detected"
        );
        report.confirming_frame = Some(confirming.index);
        report.artifact = self.persist(&confirming);

        let identity = self.check_identity(reference, &confirming);
        report.result = VerificationResult::new(true, identity.matched);
        report.distance = identity.distance;
        report.rejection = identity.failure;
        report
    }

    fn run_static_pair(&mut self, reference: &Frame, probe: Frame) -> VerificationReport {
        let mut report = VerificationReport::new(ModeKind::StaticPair);
        report.frames_processed = 1;

        let identity = self.check_identity(reference, &probe);
        report.distance = identity.distance;
        if !identity.matched {
            report.rejection = identity.failure;
            return report;
        }

        let hand = match self.landmarks.hand_landmarks(&probe) {
            Ok(hand) => hand,
            Err(e) => {
                tracing::warn!(error = %e, "hand landmark extraction failed");
                report.result = VerificationResult::new(false, true);
                report.rejection = Some(RejectionReason::LandmarkFailure {
                    message: e.to_string(),
                });
                return report;
            }
        };

        let probe_index = probe.index;
        let outcome = gesture::evaluate(hand.as_ref(), probe);
        report.result = VerificationResult::new(outcome.confirmed, true);
        if outcome.confirmed {
            tracing::info!("liveness verified: thumbs-up gesture detected");
            report.confirming_frame = Some(probe_index);
        } else {
            report.rejection = Some(if hand.is_some() {
                RejectionReason::NoGesture
            } else {
                RejectionReason::NoHand
            });
        }
        report
    }

    fn check_identity(&mut self, reference: &Frame, probe: &Frame) -> IdentityCheck {
        match self.matcher.match_faces(reference, probe) {
            Ok(m) if m.matched => {
                tracing::info!(distance = m.distance, "identity verified: faces match");
                IdentityCheck {
                    matched: true,
                    distance: Some(m.distance),
                    failure: None,
                }
            }
            Ok(m) => {
                tracing::info!(distance = m.distance, "identity failed: faces do not match");
                IdentityCheck {
                    matched: false,
                    distance: Some(m.distance),
                    failure: Some(RejectionReason::IdentityMismatch {
                        distance: m.distance,
                    }),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "face verification failed");
                let failure = match e {
                    MatchError::DetectionFailure(message) => {
                        RejectionReason::NoFaceDetected { message }
                    }
                    MatchError::Model(message) => RejectionReason::MatcherFailure { message },
                };
                IdentityCheck {
                    matched: false,
                    distance: None,
                    failure: Some(failure),
                }
            }
        }
    }

    fn persist(&mut self, frame: &Frame) -> Option<PathBuf> {
        let sink = self.artifacts.as_mut()?;
        match sink.persist(frame) {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "confirming frame saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not save confirming frame");
                None
            }
        }
    }
}
