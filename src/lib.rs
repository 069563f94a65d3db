//! # stillreel - still images to video
//!
//! `stillreel` turns a directory of PNG/JPEG images into a single H.264 MP4
//! by streaming raw frames into an external `ffmpeg` process.
//!
//! ## Features
//!
//! - Natural (`frame2` before `frame10`) or modification-time ordering
//! - Optional longer hold on the first and last frame
//! - Quality tiers mapped to fixed bitrates, or a custom bitrate
//! - Every frame resized to the first image's geometry
//! - Collision-free output names (`frame1_output_0.mp4`, `frame1_output_1.mp4`, ...)
//!
//! ## Example
//!
//! ```no_run
//! use stillreel::{EncodingConfig, QualityTier, SequenceEncoder, SortMode};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let encoder = SequenceEncoder::new(Path::new("shots"));
//! let config = EncodingConfig::new(100)
//!     .with_sort_mode(SortMode::ByName)
//!     .with_quality(QualityTier::High);
//! let summary = encoder.encode(&config)?;
//! println!("Video saved as {}", summary.output.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use stillreel::{EncodingConfig, ProgressPhase, SequenceEncoder};
//! use std::path::Path;
//!
//! let encoder = SequenceEncoder::new(Path::new("shots"));
//! encoder
//!     .encode_with_detailed_progress(&EncodingConfig::new(40), |progress| {
//!         if progress.phase == ProgressPhase::Encoding {
//!             println!("{}/{} ({:.1}%)", progress.completed, progress.total, progress.percentage);
//!         }
//!     })
//!     .unwrap();
//! ```

pub mod encoder;
pub mod enumerate;
pub mod error;
pub mod frames;
pub mod output;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::{info, warn};

pub use encoder::{
    DirectoryLocator, EncodeJob, EncoderBridge, EncoderLocator, FixedLocator, LocatorChain,
    SearchPathLocator,
};
pub use enumerate::{collect_images, natural_cmp, FrameSource, SortMode};
pub use error::{Result, StillreelError};
pub use frames::{Frame, FramePlan, FrameSequence};
pub use output::unique_output_path;
pub use prompt::{InputCollector, PromptPolicy, Prompter, RetryPolicy};

/// Represents the current phase of an encode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Listing and ordering source images
    Scanning,
    /// Decoding frames and piping them into the encoder
    Encoding,
    /// Encoder has exited
    Complete,
}

/// Progress information for an encode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Frames written so far
    pub completed: usize,
    /// Frames planned in total (0 while scanning)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn scanning() -> Self {
        Self {
            phase: ProgressPhase::Scanning,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Scanning for images...".to_string(),
        }
    }

    pub fn encoding(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::Encoding,
            completed,
            total,
            percentage,
            message: format!("Encoding frame {} of {}", completed, total),
        }
    }

    pub fn complete(total_frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Encoding complete: {} frames", total_frames),
        }
    }
}

/// Named bitrate preset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QualityTier {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
    UltraHigh,
    /// User supplied bitrate, already normalized to end in `k`
    Custom(String),
}

impl QualityTier {
    pub const CUSTOM: &'static str = "custom";

    pub fn name(&self) -> &str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::VeryHigh => "very_high",
            QualityTier::UltraHigh => "ultra_high",
            QualityTier::Custom(_) => Self::CUSTOM,
        }
    }

    pub fn bitrate(&self) -> &str {
        match self {
            QualityTier::Low => "1000k",
            QualityTier::Medium => "2000k",
            QualityTier::High => "3000k",
            QualityTier::VeryHigh => "4000k",
            QualityTier::UltraHigh => "5000k",
            QualityTier::Custom(rate) => rate,
        }
    }

    /// Look a tier up by name.
    ///
    /// Unknown names, and `custom` without a bitrate, fall back to
    /// [`QualityTier::Low`] with a warning.
    pub fn from_name(name: &str, custom_bitrate: Option<&str>) -> Self {
        match (name, custom_bitrate) {
            ("low", _) => QualityTier::Low,
            ("medium", _) => QualityTier::Medium,
            ("high", _) => QualityTier::High,
            ("very_high", _) => QualityTier::VeryHigh,
            ("ultra_high", _) => QualityTier::UltraHigh,
            (Self::CUSTOM, Some(rate)) => QualityTier::Custom(rate.to_string()),
            _ => {
                warn!(quality = name, "Invalid quality option. Using default bitrate ('low').");
                QualityTier::Low
            }
        }
    }
}

/// Resolve a tier name straight to its bitrate string.
pub fn resolve_bitrate(name: &str, custom_bitrate: Option<&str>) -> String {
    QualityTier::from_name(name, custom_bitrate)
        .bitrate()
        .to_string()
}

/// Extra on-screen time for the first and last frame, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldDurations {
    pub first_ms: u32,
    pub last_ms: u32,
}

/// Everything the user decided for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    /// Time each frame stays on screen; at least [`prompt::MIN_DELAY_MS`]
    pub delay_ms: u32,
    pub sort_mode: SortMode,
    pub hold: Option<HoldDurations>,
    pub quality: QualityTier,
}

impl EncodingConfig {
    pub fn new(delay_ms: u32) -> Self {
        Self {
            delay_ms,
            sort_mode: SortMode::ByName,
            hold: None,
            quality: QualityTier::Low,
        }
    }

    pub fn with_sort_mode(mut self, sort_mode: SortMode) -> Self {
        self.sort_mode = sort_mode;
        self
    }

    pub fn with_hold(mut self, first_ms: u32, last_ms: u32) -> Self {
        self.hold = Some(HoldDurations { first_ms, last_ms });
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn bitrate(&self) -> &str {
        self.quality.bitrate()
    }
}

fn default_encoder_names() -> Vec<String> {
    encoder::default_encoder_names()
}

/// Application configuration, read from `stillreel.json` when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// File names that count as the encoder when scanning the working directory
    #[serde(default = "default_encoder_names")]
    pub encoder_names: Vec<String>,
    /// Explicit encoder path, tried before the directory scan
    pub ffmpeg_path: Option<PathBuf>,
    /// Fall back to `ffmpeg` on `PATH`
    pub search_path: bool,
    pub prompt_policy: PromptPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoder_names: default_encoder_names(),
            ffmpeg_path: None,
            search_path: false,
            prompt_policy: PromptPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: AppConfig =
            serde_json::from_str(text).map_err(|e| StillreelError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            StillreelError::Config(msg) => {
                StillreelError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.encoder_names.iter().all(|n| n.trim().is_empty()) {
            return Err(StillreelError::Config(
                "encoder_names must contain at least one file name".to_string(),
            ));
        }
        Ok(())
    }

    /// Encoder lookup order: explicit path, working directory, then `PATH`.
    pub fn locator(&self, dir: &Path) -> LocatorChain {
        let mut chain = LocatorChain::new();
        if let Some(path) = &self.ffmpeg_path {
            chain = chain.push(FixedLocator::new(path));
        }
        chain = chain.push(DirectoryLocator::new(dir, self.encoder_names.clone()));
        if self.search_path {
            chain = chain.push(SearchPathLocator::default());
        }
        chain
    }
}

/// Sources, geometry and output path fixed before any pixel is decoded
#[derive(Debug, Clone)]
pub struct PreparedEncode {
    pub sources: Vec<FrameSource>,
    pub width: u32,
    pub height: u32,
    pub plan: FramePlan,
    pub output: PathBuf,
}

/// Outcome of a finished encode
#[derive(Debug)]
pub struct EncodeSummary {
    pub output: PathBuf,
    pub source_count: usize,
    pub frames_written: usize,
    pub width: u32,
    pub height: u32,
    pub status: ExitStatus,
}

/// Turns the images in one directory into a video
pub struct SequenceEncoder {
    dir: PathBuf,
    locator: Box<dyn EncoderLocator>,
}

impl SequenceEncoder {
    /// Encoder looked up in `dir` under the default file names
    pub fn new(dir: &Path) -> Self {
        Self::with_locator(dir, DirectoryLocator::with_default_names(dir))
    }

    pub fn with_locator(dir: &Path, locator: impl EncoderLocator + 'static) -> Self {
        Self {
            dir: dir.to_path_buf(),
            locator: Box::new(locator),
        }
    }

    pub fn from_app_config(dir: &Path, config: &AppConfig) -> Self {
        Self::with_locator(dir, config.locator(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerate sources, read the first image's geometry and pick the
    /// output path. No image is decoded yet.
    pub fn prepare(&self, config: &EncodingConfig) -> Result<PreparedEncode> {
        if config.delay_ms < prompt::MIN_DELAY_MS {
            return Err(StillreelError::InvalidInput(format!(
                "The delay must be at least {} milliseconds.",
                prompt::MIN_DELAY_MS
            )));
        }
        let sources = collect_images(&self.dir, config.sort_mode)?;
        let first = &sources[0];
        let (width, height) = frames::read_geometry(&first.path)?;
        let base = output::output_base_name(&first.path);
        let output = unique_output_path(&self.dir, &base);
        let plan = FramePlan::with_holds(sources.len(), config.delay_ms, config.hold);
        info!(
            sources = sources.len(),
            width,
            height,
            frames = plan.total_frames(),
            output = %output.display(),
            "prepared encode"
        );
        Ok(PreparedEncode {
            sources,
            width,
            height,
            plan,
            output,
        })
    }

    pub fn encode(&self, config: &EncodingConfig) -> Result<EncodeSummary> {
        self.encode_with_progress(config, |_, _| {})
    }

    /// Encode, calling `progress_callback(completed, total)` after each frame.
    pub fn encode_with_progress<F>(&self, config: &EncodingConfig, mut progress_callback: F) -> Result<EncodeSummary>
    where
        F: FnMut(usize, usize),
    {
        let prepared = self.prepare(config)?;
        self.run(config, &prepared, &mut progress_callback)
    }

    /// Encode with [`Progress`] updates for every phase.
    pub fn encode_with_detailed_progress<F>(&self, config: &EncodingConfig, progress_callback: F) -> Result<EncodeSummary>
    where
        F: Fn(Progress),
    {
        progress_callback(Progress::scanning());
        let prepared = self.prepare(config)?;
        progress_callback(Progress::encoding(0, prepared.plan.total_frames()));
        let summary = self.run(config, &prepared, &mut |done: usize, total: usize| {
            progress_callback(Progress::encoding(done, total))
        })?;
        progress_callback(Progress::complete(summary.frames_written));
        Ok(summary)
    }

    fn run(
        &self,
        config: &EncodingConfig,
        prepared: &PreparedEncode,
        progress_callback: &mut dyn FnMut(usize, usize),
    ) -> Result<EncodeSummary> {
        let bridge = EncoderBridge::locate(self.locator.as_ref())?;
        let job = EncodeJob {
            width: prepared.width,
            height: prepared.height,
            delay_ms: config.delay_ms,
            bitrate: config.bitrate().to_string(),
            output: prepared.output.clone(),
        };
        let total = prepared.plan.total_frames();
        let frames = FrameSequence::new(
            &prepared.sources,
            &prepared.plan,
            prepared.width,
            prepared.height,
        );
        let report = bridge.stream(&job, frames, |done| progress_callback(done, total))?;

        Ok(EncodeSummary {
            output: prepared.output.clone(),
            source_count: prepared.sources.len(),
            frames_written: report.frames_written,
            width: prepared.width,
            height: prepared.height,
            status: report.status,
        })
    }
}
