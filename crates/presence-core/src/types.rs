use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// MediaPipe face-mesh indices for the six EAR points of each eye, in the
/// order outer corner, upper lid ×2, inner corner, lower lid ×2.
pub mod face_indices {
    pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
}

/// MediaPipe hand-landmark indices used by the thumbs-up heuristic.
pub mod hand_indices {
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_TIP: usize = 8;
}

/// A normalized keypoint in [0, 1] image space. `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Six ordered eye-contour landmarks.
///
/// The EAR formula pairs P1 with P5 and P2 with P4; a reordered sample
/// produces a wrong ratio without any error, so the order given at
/// construction is kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeShape([Landmark; 6]);

impl EyeShape {
    pub const fn new(points: [Landmark; 6]) -> Self {
        Self(points)
    }

    /// Build from a slice; `None` unless it holds exactly six points.
    pub fn from_slice(points: &[Landmark]) -> Option<Self> {
        let points: [Landmark; 6] = points.try_into().ok()?;
        Some(Self(points))
    }

    pub fn points(&self) -> &[Landmark; 6] {
        &self.0
    }
}

/// Per-frame signal consumed by the blink state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EyeSignal {
    /// No face detected, or no usable eye geometry this frame.
    Missing,
    /// Average eye aspect ratio of the frame.
    Openness(f32),
}

/// Face-mesh landmarks of a single subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    pub points: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn left_eye(&self) -> Option<EyeShape> {
        self.eye(&face_indices::LEFT_EYE)
    }

    pub fn right_eye(&self) -> Option<EyeShape> {
        self.eye(&face_indices::RIGHT_EYE)
    }

    fn eye(&self, indices: &[usize; 6]) -> Option<EyeShape> {
        let mut points = [Landmark::default(); 6];
        for (slot, &i) in points.iter_mut().zip(indices) {
            *slot = *self.points.get(i)?;
        }
        Some(EyeShape::new(points))
    }
}

/// 21-point hand landmarks of a single hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandLandmarks {
    pub points: Vec<Landmark>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }
}

/// A decoded image, either one frame of a stream or a still.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the originating stream (0 for stills).
    pub index: u64,
    pub image: RgbImage,
    /// File the frame was decoded from, when known.
    pub origin: Option<PathBuf>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}
