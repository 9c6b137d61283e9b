//! Collaborators backed by JSON sidecar files.
//!
//! Landmark extraction and face embedding run as an external step that
//! writes its results next to each image:
//!
//! ```text
//! frame_0001.jpg
//! frame_0001.face.json       [{"x": .., "y": .., "z": ..}, ...]  (468 points, or null)
//! frame_0001.hand.json       [{"x": .., "y": ..}, ...]           (21 points, or null)
//! frame_0001.embedding.json  [0.013, -0.227, ...]
//! ```
//!
//! An absent landmark file is a clean miss. An absent embedding means the
//! embedding step found no face.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use presence_core::{
    CollaboratorError, FaceLandmarks, FaceMatch, FaceMatcher, Frame, HandLandmarks,
    LandmarkExtractor, MatchError,
};
use serde::de::DeserializeOwned;

pub const FACE_SUFFIX: &str = "face.json";
pub const HAND_SUFFIX: &str = "hand.json";
pub const EMBEDDING_SUFFIX: &str = "embedding.json";

/// `dir/frame_0001.jpg` → `dir/frame_0001.<suffix>`.
pub fn sidecar_path(image: &Path, suffix: &str) -> PathBuf {
    image.with_extension(suffix)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarLandmarks;

impl SidecarLandmarks {
    fn read<T: DeserializeOwned>(
        &self,
        frame: &Frame,
        suffix: &str,
    ) -> Result<Option<T>, CollaboratorError> {
        let Some(origin) = &frame.origin else {
            return Ok(None);
        };
        let path = sidecar_path(origin, suffix);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // `null` is an explicit "nothing detected"
        serde_json::from_str::<Option<T>>(&contents)
            .map_err(|e| CollaboratorError::Model(format!("{}: {e}", path.display())))
    }
}

impl LandmarkExtractor for SidecarLandmarks {
    fn face_landmarks(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, CollaboratorError> {
        self.read(frame, FACE_SUFFIX)
    }

    fn hand_landmarks(&mut self, frame: &Frame) -> Result<Option<HandLandmarks>, CollaboratorError> {
        self.read(frame, HAND_SUFFIX)
    }
}

/// Cosine-distance matcher over precomputed face embeddings.
#[derive(Debug, Clone, Copy)]
pub struct SidecarMatcher {
    threshold: f32,
}

impl SidecarMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn embedding(&self, frame: &Frame) -> Result<Vec<f32>, MatchError> {
        let origin = frame.origin.as_ref().ok_or_else(|| {
            MatchError::DetectionFailure("image has no source file to look up".to_string())
        })?;
        let path = sidecar_path(origin, EMBEDDING_SUFFIX);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MatchError::DetectionFailure(format!(
                    "face could not be detected in {}",
                    origin.display()
                )))
            }
            Err(e) => return Err(MatchError::Model(format!("{}: {e}", path.display()))),
        };
        let values: Vec<f32> = serde_json::from_str(&contents)
            .map_err(|e| MatchError::Model(format!("{}: {e}", path.display())))?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MatchError::Model(format!(
                "{}: embedding contains NaN/Inf",
                path.display()
            )));
        }
        Ok(values)
    }
}

impl FaceMatcher for SidecarMatcher {
    fn match_faces(&mut self, reference: &Frame, probe: &Frame) -> Result<FaceMatch, MatchError> {
        let a = self.embedding(reference)?;
        let b = self.embedding(probe)?;
        if a.len() != b.len() {
            return Err(MatchError::Model(format!(
                "embedding dimensions differ: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        let distance = cosine_distance(&a, &b).ok_or_else(|| {
            MatchError::DetectionFailure("empty or zero-norm embedding".to_string())
        })?;
        tracing::debug!(distance, threshold = self.threshold, "embeddings compared");

        Ok(FaceMatch {
            matched: distance <= self.threshold,
            distance,
        })
    }
}

/// `1 - cos(a, b)`; `None` when either vector has zero norm.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(1.0 - dot / (norm_a * norm_b))
}
