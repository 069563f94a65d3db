//! Frame planning, decoding and the lazy frame sequence fed to the encoder.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::trace;

use crate::enumerate::FrameSource;
use crate::error::{Result, StillreelError};
use crate::HoldDurations;

/// A decoded image normalized to the output geometry.
///
/// `data` holds `width * height * 3` bytes, row-major, in B, G, R order
/// (ffmpeg's `bgr24`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    fn from_rgb(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = img.into_raw();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Output geometry taken from an image's header without decoding pixels.
pub fn read_geometry(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|source| StillreelError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode `path` and stretch it to exactly `width` x `height`.
pub fn decode_frame(path: &Path, width: u32, height: u32) -> Result<Frame> {
    let mut img = image::open(path)
        .map_err(|source| StillreelError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    if img.dimensions() != (width, height) {
        trace!(path = %path.display(), from = ?img.dimensions(), to = ?(width, height), "resizing");
        img = imageops::resize(&img, width, height, FilterType::Triangle);
    }
    Ok(Frame::from_rgb(img))
}

/// Number of extra copies needed to keep a frame on screen for `hold_ms`.
pub fn hold_frame_count(hold_ms: u32, delay_ms: u32) -> usize {
    if delay_ms == 0 {
        return 0;
    }
    (hold_ms / delay_ms) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStep {
    /// Index into the ordered source list
    pub source: usize,
    /// How many times the decoded frame is emitted
    pub repeat: usize,
}

/// Which source is emitted how often, in order.
///
/// Layout: the first source `hold_first` times, every source once, then the
/// last source `hold_last` times. Holds add frames around the main run; they
/// never stretch the in-sequence occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    steps: Vec<FrameStep>,
    hold_first: usize,
    hold_last: usize,
}

impl FramePlan {
    pub fn new(source_count: usize, hold_first: usize, hold_last: usize) -> Self {
        let mut steps = Vec::with_capacity(source_count + 2);
        if source_count > 0 {
            steps.push(FrameStep {
                source: 0,
                repeat: hold_first,
            });
            steps.extend((0..source_count).map(|source| FrameStep { source, repeat: 1 }));
            steps.push(FrameStep {
                source: source_count - 1,
                repeat: hold_last,
            });
        }
        Self {
            steps,
            hold_first,
            hold_last,
        }
    }

    pub fn with_holds(source_count: usize, delay_ms: u32, hold: Option<HoldDurations>) -> Self {
        match hold {
            Some(h) => Self::new(
                source_count,
                hold_frame_count(h.first_ms, delay_ms),
                hold_frame_count(h.last_ms, delay_ms),
            ),
            None => Self::new(source_count, 0, 0),
        }
    }

    pub fn steps(&self) -> &[FrameStep] {
        &self.steps
    }

    pub fn hold_first(&self) -> usize {
        self.hold_first
    }

    pub fn hold_last(&self) -> usize {
        self.hold_last
    }

    pub fn total_frames(&self) -> usize {
        self.steps.iter().map(|s| s.repeat).sum()
    }
}

/// Lazily decodes frames in plan order.
///
/// Each step decodes its source once and yields it `repeat` times; steps with
/// no repeats are skipped without touching the file. After an error the
/// sequence is finished.
pub struct FrameSequence<'a> {
    sources: &'a [FrameSource],
    steps: &'a [FrameStep],
    next_step: usize,
    width: u32,
    height: u32,
    current: Option<(Frame, usize)>,
}

impl<'a> FrameSequence<'a> {
    pub fn new(sources: &'a [FrameSource], plan: &'a FramePlan, width: u32, height: u32) -> Self {
        Self {
            sources,
            steps: plan.steps(),
            next_step: 0,
            width,
            height,
            current: None,
        }
    }
}

impl Iterator for FrameSequence<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((frame, remaining)) = self.current.take() {
                if remaining > 1 {
                    let out = frame.clone();
                    self.current = Some((frame, remaining - 1));
                    return Some(Ok(out));
                }
                return Some(Ok(frame));
            }

            let step = *self.steps.get(self.next_step)?;
            self.next_step += 1;
            if step.repeat == 0 {
                continue;
            }

            let Some(source) = self.sources.get(step.source) else {
                self.next_step = self.steps.len();
                return Some(Err(StillreelError::invalid(format!(
                    "frame plan refers to missing source #{}",
                    step.source
                ))));
            };
            match decode_frame(&source.path, self.width, self.height) {
                Ok(frame) => self.current = Some((frame, step.repeat)),
                Err(e) => {
                    self.next_step = self.steps.len();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn hold_counts_floor() {
        assert_eq!(hold_frame_count(1000, 100), 10);
        assert_eq!(hold_frame_count(250, 100), 2);
        assert_eq!(hold_frame_count(50, 100), 0);
    }

    #[test]
    fn plan_without_holds_is_one_per_source() {
        let plan = FramePlan::with_holds(5, 100, None);
        assert_eq!(plan.total_frames(), 5);
        assert_eq!(plan.hold_first(), 0);
        assert_eq!(plan.hold_last(), 0);
    }

    #[test]
    fn plan_with_holds_adds_extra_frames() {
        let hold = HoldDurations {
            first_ms: 500,
            last_ms: 1000,
        };
        let plan = FramePlan::with_holds(3, 100, Some(hold));
        assert_eq!(plan.total_frames(), 5 + 3 + 10);
        let steps = plan.steps();
        assert_eq!(steps.first(), Some(&FrameStep { source: 0, repeat: 5 }));
        assert_eq!(steps.last(), Some(&FrameStep { source: 2, repeat: 10 }));
    }

    #[test]
    fn empty_plan_has_no_frames() {
        assert_eq!(FramePlan::new(0, 3, 3).total_frames(), 0);
    }

    #[test]
    fn frame_bytes_are_bgr() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        img.put_pixel(1, 0, Rgb([40, 50, 60]));
        let frame = Frame::from_rgb(img);
        assert_eq!(frame.data, vec![30, 20, 10, 60, 50, 40]);
        assert_eq!(frame.data.len(), Frame::byte_len(2, 1));
    }
}
