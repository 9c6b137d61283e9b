//! Image-file frame input: a directory of frames stands in for the camera,
//! and single stills are loaded for the reference and probe images.

use std::path::{Path, PathBuf};

use presence_core::{Frame, FrameSource, SourceError};
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
#[error("frame source {path} unavailable: {source}")]
pub struct SourceOpenError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
#[error("failed to decode image {path}: {source}")]
pub struct ImageLoadError {
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

/// Frames are the image files of one directory, in lexical file-name order
/// (`frame_0001.jpg`, `frame_0002.jpg`, ...). Indices start at 1.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    frames: std::vec::IntoIter<PathBuf>,
    next_index: u64,
}

impl DirectoryFrameSource {
    /// List the directory up front. A missing or unreadable directory is a
    /// fatal resource failure.
    pub fn open(dir: &Path) -> Result<Self, SourceOpenError> {
        let open_err = |source: std::io::Error| SourceOpenError {
            path: dir.to_path_buf(),
            source,
        };

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(open_err)? {
            let path = entry.map_err(open_err)?.path();
            if path.is_file() && is_frame_image(&path) {
                frames.push(path);
            }
        }
        frames.sort();

        if frames.is_empty() {
            tracing::warn!(dir = %dir.display(), "frame directory holds no images");
        } else {
            tracing::info!(dir = %dir.display(), frames = frames.len(), "frame source opened");
        }

        Ok(Self {
            frames: frames.into_iter(),
            next_index: 0,
        })
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.frames.next() else {
            return Ok(None);
        };
        self.next_index += 1;
        let index = self.next_index;

        let image = image::open(&path).map_err(|e| SourceError::Decode {
            index,
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(Some(Frame::new(index, image.to_rgb8()).with_origin(path)))
    }
}

/// Decode a single still image (index 0).
pub fn load_still(path: &Path) -> Result<Frame, ImageLoadError> {
    let image = image::open(path).map_err(|source| ImageLoadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Frame::new(0, image.to_rgb8()).with_origin(path))
}

fn is_frame_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}
