//! Confirming-frame persistence and the JSON-lines audit trail.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use presence_core::{ArtifactError, ArtifactSink, Frame, VerificationReport};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Writes the confirming frame to one fixed path, replacing any earlier capture.
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    path: PathBuf,
}

impl FileArtifactSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArtifactSink for FileArtifactSink {
    fn persist(&mut self, frame: &Frame) -> Result<PathBuf, ArtifactError> {
        let write_err = |reason: String| ArtifactError::Write {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        frame
            .image
            .save(&self.path)
            .map_err(|e| write_err(e.to_string()))?;

        tracing::info!(path = %self.path.display(), frame = frame.index, "confirming frame saved");
        Ok(self.path.clone())
    }
}

/// One line of the audit log.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    pub session_id: String,
    pub timestamp: String,
    pub reference: &'a Path,
    #[serde(flatten)]
    pub report: &'a VerificationReport,
    /// SHA-256 of the persisted confirming frame, so later tampering shows.
    pub artifact_sha256: Option<String>,
}

impl<'a> AuditRecord<'a> {
    pub fn new(reference: &'a Path, report: &'a VerificationReport) -> Self {
        let artifact_sha256 = report.artifact.as_deref().and_then(|path| {
            sha256_file_hex(path)
                .map_err(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "could not hash artifact");
                })
                .ok()
        });

        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            reference,
            report,
            artifact_sha256,
        }
    }
}

/// Append one record for `report` to the JSON-lines log at `log`.
pub fn append_audit_record(log: &Path, reference: &Path, report: &VerificationReport) -> Result<()> {
    let record = AuditRecord::new(reference, report);
    let mut line = serde_json::to_string(&record).context("failed to serialize audit record")?;
    line.push('\n');

    if let Some(parent) = log.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .with_context(|| format!("failed to open audit log {}", log.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to write audit log {}", log.display()))?;

    tracing::debug!(log = %log.display(), session = %record.session_id, "audit record written");
    Ok(())
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
