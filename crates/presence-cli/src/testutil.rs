//! Fixtures shared by the unit tests: scratch directories and sidecar files.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use presence_core::types::{face_indices, hand_indices};
use presence_core::Landmark;

/// Fresh, existing directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "presence-test-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// 2×2 PNG whose red channel is `marker`.
pub fn write_image(path: &Path, marker: u8) {
    RgbImage::from_pixel(2, 2, Rgb([marker, 0, 0]))
        .save(path)
        .unwrap();
}

/// Face-mesh sidecar with both eyes measuring `ear`.
pub fn write_face(image: &Path, ear: f32) {
    let gap = ear * 0.3;
    let mut points = vec![Landmark::new(0.5, 0.5); 468];
    for (indices, cx) in [(face_indices::LEFT_EYE, 0.7f32), (face_indices::RIGHT_EYE, 0.3)] {
        let eye = [
            Landmark::new(cx - 0.15, 0.4),
            Landmark::new(cx - 0.05, 0.4 - gap / 2.0),
            Landmark::new(cx + 0.05, 0.4 - gap / 2.0),
            Landmark::new(cx + 0.15, 0.4),
            Landmark::new(cx + 0.05, 0.4 + gap / 2.0),
            Landmark::new(cx - 0.05, 0.4 + gap / 2.0),
        ];
        for (i, p) in indices.iter().zip(eye) {
            points[*i] = p;
        }
    }
    fs::write(
        image.with_extension("face.json"),
        serde_json::to_string(&points).unwrap(),
    )
    .unwrap();
}

/// Hand sidecar, thumbs-up when `up`.
pub fn write_hand(image: &Path, up: bool) {
    let mut points = vec![Landmark::new(0.5, 0.5); 21];
    points[hand_indices::THUMB_TIP].y = if up { 0.1 } else { 0.5 };
    points[hand_indices::THUMB_IP].y = 0.3;
    points[hand_indices::INDEX_FINGER_TIP].y = 0.6;
    points[hand_indices::INDEX_FINGER_PIP].y = 0.4;
    fs::write(
        image.with_extension("hand.json"),
        serde_json::to_string(&points).unwrap(),
    )
    .unwrap();
}

pub fn write_embedding(image: &Path, values: &[f32]) {
    fs::write(
        image.with_extension("embedding.json"),
        serde_json::to_string(values).unwrap(),
    )
    .unwrap();
}
