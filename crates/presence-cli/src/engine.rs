use std::path::PathBuf;

use presence_core::{
    Mode, PipelineConfig, PipelineError, QuitFlag, VerificationPipeline, VerificationReport,
};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::artifact::FileArtifactSink;
use crate::config::{Config, ConfigError};
use crate::sidecar::{SidecarLandmarks, SidecarMatcher};
use crate::source::{load_still, DirectoryFrameSource, ImageLoadError, SourceOpenError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("camera error: {0}")]
    Source(#[from] SourceOpenError),
    #[error("image error: {0}")]
    Image(#[from] ImageLoadError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// What the engine should verify.
#[derive(Debug, Clone)]
pub enum Request {
    Live { reference: PathBuf, frames: PathBuf },
    Pair { reference: PathBuf, probe: PathBuf },
}

/// Inputs acquired before the engine thread starts.
enum Job {
    Live(DirectoryFrameSource),
    Pair(presence_core::Frame),
}

/// Handle to a verification running on the engine thread.
pub struct EngineHandle {
    reply: oneshot::Receiver<VerificationReport>,
    quit: QuitFlag,
}

impl EngineHandle {
    /// Stop at the next frame boundary.
    pub fn abort(&self) {
        self.quit.raise();
    }

    /// Wait for the report. Ctrl-C raises the quit flag; the run then ends
    /// at its next frame boundary and still reports.
    pub async fn wait(mut self) -> Result<VerificationReport, EngineError> {
        let reply = tokio::select! {
            reply = &mut self.reply => reply,
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::warn!("quit requested, stopping at next frame");
                self.abort();
                (&mut self.reply).await
            }
        };
        reply.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn one verification on a dedicated OS thread.
///
/// Loads the reference image, opens the frame source (or loads the probe)
/// and builds the pipeline synchronously, so a missing camera or image
/// fails fast before any liveness processing starts. Blink settings are only
/// validated for live capture; static-pair runs never read them.
pub fn spawn(config: &Config, request: Request) -> Result<EngineHandle, EngineError> {
    config.validate()?;

    let (reference_path, job) = match request {
        Request::Live { reference, frames } => {
            let source = DirectoryFrameSource::open(&frames)?;
            (reference, Job::Live(source))
        }
        Request::Pair { reference, probe } => {
            let probe = load_still(&probe)?;
            (reference, Job::Pair(probe))
        }
    };
    let reference = load_still(&reference_path)?;
    tracing::info!(path = %reference_path.display(), "reference image loaded");

    let pipeline_config = match job {
        Job::Live(_) => config.pipeline_config(),
        Job::Pair(_) => PipelineConfig::default(),
    };

    let quit = QuitFlag::new();
    let mut pipeline = VerificationPipeline::new(
        SidecarLandmarks,
        SidecarMatcher::new(config.match_threshold),
        pipeline_config,
    )?
    .with_quit_flag(quit.clone());

    if matches!(job, Job::Live(_)) {
        pipeline =
            pipeline.with_artifact_sink(Box::new(FileArtifactSink::new(&config.capture_path)));
        tracing::info!(
            ear_threshold = config.ear_threshold,
            min_closed_frames = config.min_closed_frames,
            miss_policy = ?config.miss_policy,
            timeout_secs = ?config.timeout_secs,
            "look at the camera and blink"
        );
    }

    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            let report = match job {
                Job::Live(mut source) => pipeline.run(Mode::LiveCapture(&mut source), &reference),
                Job::Pair(probe) => pipeline.run(Mode::StaticPair { probe }, &reference),
            };
            // source and collaborators are dropped with the closure on every path
            let _ = tx.send(report);
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { reply: rx, quit })
}
