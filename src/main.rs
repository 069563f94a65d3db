use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use stillreel::{AppConfig, InputCollector, Prompter, SequenceEncoder, StillreelError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "stillreel.json";
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        return AppConfig::from_file(p).with_context(|| format!("reading config {}", p.display()));
    }

    // Look for stillreel.json in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("stillreel");
        d.push(CONFIG_FILE);
        tried.push(d);
    }
    tried.push(PathBuf::from(CONFIG_FILE));

    for p in &tried {
        if p.exists() {
            debug!(config = %p.display(), "loading config");
            return AppConfig::from_file(p)
                .with_context(|| format!("reading config {}", p.display()));
        }
    }

    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Interactive still images to MP4 stitcher.")]
struct Args {
    /// Directory holding the images and the encoder (defaults to the binary's directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Config file to use instead of the default search locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the ffmpeg binary, tried before the directory scan
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Log debug details to standard error
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

/// Answers come from the terminal through dialoguer.
struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, prompt: &str) -> stillreel::Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)
    }

    fn say(&mut self, line: &str) {
        println!("{}", line);
    }
}

fn prompt_error(e: dialoguer::Error) -> StillreelError {
    match e {
        dialoguer::Error::IO(io) => StillreelError::Io(io),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn binary_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating the running binary")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("binary path {} has no parent directory", exe.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let dir = match args.dir {
        Some(d) => d,
        None => binary_dir()?,
    };
    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", dir.display()));
    }
    let dir = fs::canonicalize(&dir).with_context(|| format!("resolving {}", dir.display()))?;

    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(p) = args.ffmpeg {
        cfg.ffmpeg_path = Some(p);
    }

    // --- Interactive Prompts ---
    let mut prompter = TerminalPrompter;
    let encoding = match InputCollector::new(&mut prompter, cfg.prompt_policy).collect() {
        Ok(c) => c,
        Err(StillreelError::InvalidInput(msg)) => {
            println!("Invalid input: {}", msg);
            return Ok(());
        }
        Err(e) => return Err(e).context("reading answers"),
    };

    // --- Execution ---
    let encoder = SequenceEncoder::from_app_config(&dir, &cfg);
    let mut progress_bar: Option<ProgressBar> = None;
    let result = encoder.encode_with_progress(&encoding, |completed, total| {
        let pb = progress_bar.get_or_insert_with(|| {
            // Initialize progress bar on first callback
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message("Streaming frames");
            pb
        });
        pb.set_position(completed as u64);
    });
    if let Some(pb) = progress_bar.take() {
        pb.finish_with_message("Done");
    }

    match result {
        Ok(summary) => {
            debug!(
                frames = summary.frames_written,
                sources = summary.source_count,
                width = summary.width,
                height = summary.height,
                "encode finished"
            );
            println!("Video saved as {}", summary.output.display());
        }
        Err(e @ StillreelError::EncoderNotFound(_)) => println!("Error: {}", e),
        Err(e) if e.is_user_facing() => println!("{}", e),
        Err(e) => return Err(e).context("encoding video"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_become_io_errors() {
        let err = prompt_error(dialoguer::Error::IO(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof,
        )));
        assert!(matches!(err, StillreelError::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn progress_template_shows_the_message() {
        assert!(ProgressStyle::default_bar().template(PROGRESS_TEMPLATE).is_ok());
        assert!(PROGRESS_TEMPLATE.ends_with("{msg}"));
    }

    #[test]
    fn args_parse_without_flags() {
        let args = Args::try_parse_from(["stillreel"]).unwrap();
        assert!(args.dir.is_none());
        assert!(!args.verbose);
        let args = Args::try_parse_from(["stillreel", "--dir", "shots", "-v"]).unwrap();
        assert_eq!(args.dir, Some(PathBuf::from("shots")));
        assert!(args.verbose);
    }
}
