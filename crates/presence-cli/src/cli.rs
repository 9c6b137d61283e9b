use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use presence_core::MissPolicy;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "presence",
    version,
    about = "Liveness-gated identity confirmation for attendance check-in"
)]
pub struct Cli {
    /// Print the verification report as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file (default: $PRESENCE_CONFIG).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append a JSON-lines audit record for this run.
    #[arg(long, global = true, value_name = "PATH")]
    pub audit_log: Option<PathBuf>,

    /// Maximum cosine distance accepted as the same person.
    #[arg(long, global = true, value_name = "DISTANCE")]
    pub match_threshold: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch a frame stream for a blink, then match the confirming frame.
    Live(LiveArgs),
    /// Match a still probe image, then check it for a thumbs-up gesture.
    Pair(PairArgs),
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    /// Enrolled reference image.
    #[arg(long, value_name = "IMAGE")]
    pub reference: PathBuf,

    /// Directory of captured frames, read in file-name order.
    #[arg(long, value_name = "DIR")]
    pub frames: PathBuf,

    /// Where to save the frame that confirmed the blink.
    #[arg(long, value_name = "PATH")]
    pub capture_path: Option<PathBuf>,

    /// Give up after this many seconds without a blink (0 waits indefinitely).
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Eye aspect ratio below which an eye counts as closed.
    #[arg(long, value_name = "EAR")]
    pub ear_threshold: Option<f32>,

    /// Consecutive closed frames that make a blink.
    #[arg(long, value_name = "N")]
    pub min_closed_frames: Option<u32>,

    /// Frames without a face during a closure: ignore, reset or count-closed.
    #[arg(long, value_name = "POLICY")]
    pub miss_policy: Option<MissPolicy>,
}

#[derive(Args, Debug)]
pub struct PairArgs {
    /// Enrolled reference image.
    #[arg(long, value_name = "IMAGE")]
    pub reference: PathBuf,

    /// Still image that must match the reference and show a thumbs-up.
    #[arg(long, value_name = "IMAGE")]
    pub probe: PathBuf,
}

impl Cli {
    /// Apply command-line flags over the file/env configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.audit_log {
            config.audit_log = Some(path.clone());
        }
        if let Some(v) = self.match_threshold {
            config.match_threshold = v;
        }

        if let Command::Live(args) = &self.command {
            if let Some(path) = &args.capture_path {
                config.capture_path = path.clone();
            }
            if let Some(secs) = args.timeout_secs {
                config.timeout_secs = (secs > 0).then_some(secs);
            }
            if let Some(v) = args.ear_threshold {
                config.ear_threshold = v;
            }
            if let Some(v) = args.min_closed_frames {
                config.min_closed_frames = v;
            }
            if let Some(v) = args.miss_policy {
                config.miss_policy = v;
            }
        }
    }

    pub fn reference(&self) -> &Path {
        match &self.command {
            Command::Live(args) => &args.reference,
            Command::Pair(args) => &args.reference,
        }
    }
}
