//! presence-core: liveness-gated identity confirmation.
//!
//! A subject is accepted only when two independent checks agree: a liveness
//! signal (an eye blink observed across a frame stream, or a thumbs-up
//! gesture in a still image) and an identity match against an enrolled
//! reference image. Landmark extraction, face matching, frame capture and
//! artifact storage are injected through the traits in [`collaborator`].

pub mod collaborator;
pub mod geometry;
pub mod liveness;
pub mod pipeline;
pub mod types;

pub use collaborator::{
    ArtifactError, ArtifactSink, CollaboratorError, FaceMatch, FaceMatcher, FrameSource,
    LandmarkExtractor, MatchError, SourceError,
};
pub use geometry::GeometryError;
pub use liveness::{BlinkConfig, BlinkDetector, BlinkPhase, LivenessOutcome, MissPolicy};
pub use pipeline::{
    Mode, ModeKind, PipelineConfig, PipelineError, QuitFlag, RejectionReason, VerificationPipeline,
    VerificationReport, VerificationResult,
};
pub use types::{EyeShape, EyeSignal, FaceLandmarks, Frame, HandLandmarks, Landmark};
