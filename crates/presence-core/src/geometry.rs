//! Landmark geometry: eye aspect ratio for blinks, finger relation for the
//! thumbs-up gesture. Everything here is pure and stateless.
//!
//! The eye aspect ratio (Soukupová & Čech, 2016) compares the two vertical
//! lid distances of an eye against its horizontal span:
//!
//! ```text
//!        |P1 - P5| + |P2 - P4|
//! EAR = -----------------------
//!            2 · |P0 - P3|
//! ```
//!
//! An open eye sits around 0.3; it collapses towards 0 while the lids meet.

use thiserror::Error;

use crate::types::{hand_indices, EyeShape, EyeSignal, FaceLandmarks, HandLandmarks, Landmark};

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("degenerate eye geometry: horizontal span is {0}")]
    Degenerate(f32),
}

/// Euclidean distance in the image plane.
pub fn euclidean_distance(a: &Landmark, b: &Landmark) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Eye aspect ratio of one eye.
///
/// Fails with [`GeometryError::Degenerate`] when the corner points coincide
/// (or the span is not finite) instead of dividing by zero.
pub fn eye_aspect_ratio(eye: &EyeShape) -> Result<f32, GeometryError> {
    let [p0, p1, p2, p3, p4, p5] = eye.points();
    let vertical_1 = euclidean_distance(p1, p5);
    let vertical_2 = euclidean_distance(p2, p4);
    let horizontal = euclidean_distance(p0, p3);

    if !horizontal.is_finite() || horizontal <= f32::EPSILON {
        return Err(GeometryError::Degenerate(horizontal));
    }

    Ok((vertical_1 + vertical_2) / (2.0 * horizontal))
}

/// Sentinel form of [`eye_aspect_ratio`]: a degenerate eye is reported as
/// unavailable rather than as an error.
pub fn eye_openness(eye: &EyeShape) -> Option<f32> {
    match eye_aspect_ratio(eye) {
        Ok(ear) => Some(ear),
        Err(e) => {
            tracing::trace!(error = %e, "eye sample discarded");
            None
        }
    }
}

/// Mean openness of both eyes, weighted equally.
///
/// When one eye is unavailable the other eye's value stands in for it; when
/// both are unavailable the frame abstains (`None`).
pub fn average_eye_openness(left: Option<f32>, right: Option<f32>) -> Option<f32> {
    match (left, right) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Reduce a face mesh to the blink signal for one frame.
pub fn face_eye_signal(face: &FaceLandmarks) -> EyeSignal {
    let left = face.left_eye().as_ref().and_then(eye_openness);
    let right = face.right_eye().as_ref().and_then(eye_openness);
    match average_eye_openness(left, right) {
        Some(v) => EyeSignal::Openness(v),
        None => EyeSignal::Missing,
    }
}

/// Thumbs-up heuristic: thumb tip above its IP joint while the index finger
/// tip sits below its PIP joint (curled). Smaller `y` is higher in the image.
///
/// Single frame, no rotation handling. A hand with too few points is never
/// a thumbs-up.
pub fn detect_thumbs_up(hand: &HandLandmarks) -> bool {
    let (Some(thumb_tip), Some(thumb_ip), Some(index_tip), Some(index_pip)) = (
        hand.get(hand_indices::THUMB_TIP),
        hand.get(hand_indices::THUMB_IP),
        hand.get(hand_indices::INDEX_FINGER_TIP),
        hand.get(hand_indices::INDEX_FINGER_PIP),
    ) else {
        return false;
    };

    thumb_tip.y < thumb_ip.y && index_tip.y > index_pip.y
}
