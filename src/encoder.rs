//! Locating ffmpeg and streaming raw frames into it.

use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcCommand, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, StillreelError};
use crate::frames::Frame;

pub const VIDEO_CODEC: &str = "libx264";
pub const INPUT_PIXEL_FORMAT: &str = "bgr24";
pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";

/// File names accepted as the encoder binary when scanning a directory.
pub fn default_encoder_names() -> Vec<String> {
    if cfg!(windows) {
        vec!["ffmpeg.exe".to_string()]
    } else {
        vec!["ffmpeg.exe".to_string(), "ffmpeg".to_string()]
    }
}

/// Finds the encoder executable.
pub trait EncoderLocator {
    fn locate(&self) -> Result<PathBuf>;

    /// Where this locator looks, for "not found" messages.
    fn describe(&self) -> String;
}

/// Looks for a file in `dir` whose name equals one of `names`, ignoring case.
/// Earlier names win when several match.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    dir: PathBuf,
    names: Vec<String>,
}

impl DirectoryLocator {
    pub fn new(dir: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            names,
        }
    }

    pub fn with_default_names(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, default_encoder_names())
    }
}

impl EncoderLocator for DirectoryLocator {
    fn locate(&self) -> Result<PathBuf> {
        let mut entries: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.push((name.to_lowercase(), path));
            }
        }

        for wanted in &self.names {
            let wanted = wanted.to_lowercase();
            if let Some((_, path)) = entries.iter().find(|(name, _)| *name == wanted) {
                return Ok(path.clone());
            }
        }
        Err(StillreelError::EncoderNotFound(self.describe()))
    }

    fn describe(&self) -> String {
        let names = if self.names.is_empty() {
            "ffmpeg".to_string()
        } else {
            self.names.join(" or ")
        };
        format!("{} in {}", names, self.dir.display())
    }
}

/// A configured path to the encoder.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    path: PathBuf,
}

impl FixedLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EncoderLocator for FixedLocator {
    fn locate(&self) -> Result<PathBuf> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            Err(StillreelError::EncoderNotFound(self.describe()))
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Resolves a program name on `PATH`.
#[derive(Debug, Clone)]
pub struct SearchPathLocator {
    program: String,
}

impl SearchPathLocator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SearchPathLocator {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderLocator for SearchPathLocator {
    fn locate(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| StillreelError::EncoderNotFound(self.describe()))
    }

    fn describe(&self) -> String {
        format!("{} on PATH", self.program)
    }
}

/// Tries each locator in turn and returns the first hit.
#[derive(Default)]
pub struct LocatorChain {
    locators: Vec<Box<dyn EncoderLocator>>,
}

impl LocatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, locator: impl EncoderLocator + 'static) -> Self {
        self.locators.push(Box::new(locator));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

impl EncoderLocator for LocatorChain {
    fn locate(&self) -> Result<PathBuf> {
        for locator in &self.locators {
            match locator.locate() {
                Ok(path) => {
                    debug!(encoder = %path.display(), "located encoder");
                    return Ok(path);
                }
                Err(StillreelError::EncoderNotFound(what)) => {
                    debug!(candidate = %what, "encoder candidate missing");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StillreelError::EncoderNotFound(self.describe()))
    }

    fn describe(&self) -> String {
        if self.locators.is_empty() {
            return "no configured location".to_string();
        }
        self.locators
            .iter()
            .map(|l| l.describe())
            .collect::<Vec<_>>()
            .join(", then ")
    }
}

/// Frame rate for the given per-frame delay, not rounded.
///
/// Whole rates keep one decimal (`10.0`); fractional ones use the shortest
/// exact representation (`33.333333333333336`).
pub fn format_frame_rate(delay_ms: u32) -> String {
    let fps = 1000.0 / f64::from(delay_ms);
    if fps.fract() == 0.0 {
        format!("{:.1}", fps)
    } else {
        format!("{}", fps)
    }
}

/// Everything ffmpeg needs to know about one encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub width: u32,
    pub height: u32,
    pub delay_ms: u32,
    pub bitrate: String,
    pub output: PathBuf,
}

impl EncodeJob {
    pub fn frame_len(&self) -> usize {
        Frame::byte_len(self.width, self.height)
    }

    /// Arguments for reading headerless `bgr24` from stdin and writing H.264 MP4.
    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-f",
            "rawvideo",
            "-vcodec",
            "rawvideo",
            "-s",
        ]
        .iter()
        .map(|s| OsString::from(*s))
        .collect();
        args.push(format!("{}x{}", self.width, self.height).into());
        args.push("-pix_fmt".into());
        args.push(INPUT_PIXEL_FORMAT.into());
        args.push("-r".into());
        args.push(format_frame_rate(self.delay_ms).into());
        args.push("-i".into());
        args.push("-".into());
        args.push("-c:v".into());
        args.push(VIDEO_CODEC.into());
        args.push("-b:v".into());
        args.push(self.bitrate.clone().into());
        args.push("-pix_fmt".into());
        args.push(OUTPUT_PIXEL_FORMAT.into());
        args.push(self.output.clone().into_os_string());
        args
    }
}

#[derive(Debug)]
pub struct EncodeReport {
    pub frames_written: usize,
    pub status: ExitStatus,
}

/// A located encoder binary ready to run jobs.
#[derive(Debug, Clone)]
pub struct EncoderBridge {
    program: PathBuf,
}

impl EncoderBridge {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn locate(locator: &dyn EncoderLocator) -> Result<Self> {
        locator.locate().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Spawn the encoder, pipe every frame into its stdin, close it and wait.
    ///
    /// The exit status is returned but not judged. `on_frame` receives the
    /// running count of frames written.
    pub fn stream<I, F>(&self, job: &EncodeJob, frames: I, mut on_frame: F) -> Result<EncodeReport>
    where
        I: IntoIterator<Item = Result<Frame>>,
        F: FnMut(usize),
    {
        let args = job.ffmpeg_args();
        debug!(program = %self.program.display(), ?args, "spawning encoder");

        let mut child = ProcCommand::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stdin was not captured"))?;
        let mut writer = BufWriter::with_capacity(job.frame_len().max(8 * 1024), stdin);

        let frames_written = match write_frames(&mut writer, frames, job.frame_len(), &mut on_frame) {
            Ok(n) => n,
            Err(e) => {
                // A half-written video must not be finalized or left behind.
                let _ = child.kill();
                drop(writer);
                let _ = child.wait();
                discard_partial_output(&job.output);
                return Err(e);
            }
        };
        // Closing stdin signals end of stream; ffmpeg finalizes the file after that.
        drop(writer);
        let status = child.wait()?;

        if status.success() {
            info!(frames = frames_written, output = %job.output.display(), "encoder finished");
        } else {
            warn!(%status, output = %job.output.display(), "encoder exited unsuccessfully");
        }
        Ok(EncodeReport {
            frames_written,
            status,
        })
    }
}

fn discard_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => warn!(output = %output.display(), "removed partial video"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(output = %output.display(), error = %e, "could not remove partial video"),
    }
}

fn write_frames<W, I, F>(writer: &mut W, frames: I, frame_len: usize, on_frame: &mut F) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<Frame>>,
    F: FnMut(usize),
{
    let mut count = 0;
    for frame in frames {
        let frame = frame?;
        if frame.data.len() != frame_len {
            return Err(StillreelError::invalid(format!(
                "frame {} is {}x{}, encoder expects {} bytes",
                count,
                frame.width,
                frame.height,
                frame_len
            )));
        }
        writer.write_all(&frame.data)?;
        count += 1;
        on_frame(count);
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> EncodeJob {
        EncodeJob {
            width: 640,
            height: 480,
            delay_ms: 100,
            bitrate: "1000k".to_string(),
            output: PathBuf::from("frame1_output_0.mp4"),
        }
    }

    #[test]
    fn frame_rate_formatting() {
        assert_eq!(format_frame_rate(100), "10.0");
        assert_eq!(format_frame_rate(10), "100.0");
        assert_eq!(format_frame_rate(30), "33.333333333333336");
        assert_eq!(format_frame_rate(400), "2.5");
    }

    #[test]
    fn argument_order() {
        let args: Vec<String> = job()
            .ffmpeg_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-f", "rawvideo", "-vcodec", "rawvideo", "-s", "640x480", "-pix_fmt",
                "bgr24", "-r", "10.0", "-i", "-", "-c:v", "libx264", "-b:v", "1000k",
                "-pix_fmt", "yuv420p", "frame1_output_0.mp4",
            ]
        );
    }

    #[test]
    fn write_frames_counts_and_checks_size() {
        let good = Frame {
            width: 1,
            height: 1,
            data: vec![1, 2, 3],
        };
        let mut sink: Vec<u8> = Vec::new();
        let mut seen = Vec::new();
        let n = write_frames(
            &mut sink,
            vec![Ok(good.clone()), Ok(good.clone())],
            3,
            &mut |c| seen.push(c),
        )
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(sink, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(seen, vec![1, 2]);

        let bad = Frame {
            width: 2,
            height: 1,
            data: vec![0; 6],
        };
        let mut sink: Vec<u8> = Vec::new();
        assert!(write_frames(&mut sink, vec![Ok(bad)], 3, &mut |_| {}).is_err());
    }

    #[test]
    fn directory_locator_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("FFmpeg.EXE"), b"").unwrap();
        let found = DirectoryLocator::new(dir.path(), vec!["ffmpeg.exe".into()])
            .locate()
            .unwrap();
        assert_eq!(found, dir.path().join("FFmpeg.EXE"));
    }

    #[test]
    fn directory_locator_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryLocator::new(dir.path(), vec!["ffmpeg.exe".into()])
            .locate()
            .unwrap_err();
        let expected = format!("ffmpeg.exe in {}", dir.path().display());
        assert!(matches!(err, StillreelError::EncoderNotFound(ref n) if *n == expected));
    }

    #[test]
    fn not_found_message_names_every_place_tried() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("bin").join("ffmpeg");
        let chain = LocatorChain::new()
            .push(FixedLocator::new(&missing))
            .push(DirectoryLocator::new(dir.path(), vec!["ffmpeg.exe".into(), "ffmpeg".into()]));
        let err = chain.locate().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "Encoder not found: looked for {}, then ffmpeg.exe or ffmpeg in {}",
                missing.display(),
                dir.path().display()
            )
        );
        assert_eq!(
            SearchPathLocator::new("no-such-encoder-xyz").describe(),
            "no-such-encoder-xyz on PATH"
        );
    }

    #[test]
    fn chain_falls_through_to_next() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("enc");
        fs::write(&exe, b"").unwrap();
        let chain = LocatorChain::new()
            .push(DirectoryLocator::new(dir.path(), vec!["ffmpeg.exe".into()]))
            .push(FixedLocator::new(&exe));
        assert_eq!(chain.locate().unwrap(), exe);
    }
}
