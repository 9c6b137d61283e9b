//! Capability traits for everything the core does not implement itself:
//! landmark extraction, face matching, frame capture and artifact storage.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{FaceLandmarks, Frame, HandLandmarks};

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("landmark model failed: {0}")]
    Model(String),
    #[error("landmark input unreadable: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no face detected: {0}")]
    DetectionFailure(String),
    #[error("face matcher failed: {0}")]
    Model(String),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("frame {index} could not be decoded: {reason}")]
    Decode { index: u64, reason: String },
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to write artifact {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Maps an image to face-mesh or hand keypoints.
///
/// `Ok(None)` is a clean miss (nothing detected); `Err` means the model
/// itself failed.
pub trait LandmarkExtractor {
    fn face_landmarks(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, CollaboratorError>;
    fn hand_landmarks(&mut self, frame: &Frame) -> Result<Option<HandLandmarks>, CollaboratorError>;
}

/// Outcome of comparing two face images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatch {
    pub matched: bool,
    /// Embedding distance; lower means more similar.
    pub distance: f32,
}

/// Judges whether two images show the same person.
pub trait FaceMatcher {
    fn match_faces(&mut self, reference: &Frame, probe: &Frame) -> Result<FaceMatch, MatchError>;
}

/// Lazy, possibly endless sequence of frames.
///
/// `Ok(None)` ends the stream. `Err` is a failed read that the caller skips
/// before asking again.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Stores the confirming frame for later audit.
pub trait ArtifactSink {
    fn persist(&mut self, frame: &Frame) -> Result<PathBuf, ArtifactError>;
}
