//! Source image discovery and ordering.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, StillreelError};

/// File name suffixes accepted as source images. Matching is case-sensitive.
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];

/// How source images are ordered in the output video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Natural alphanumeric order of file names (`frame2` before `frame10`)
    ByName,
    /// Ascending file modification time
    ByModified,
}

/// One enumerated source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSource {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

impl FrameSource {
    /// Names that are not valid UTF-8 are kept, with a lossy `name` for
    /// matching and sorting; `path` stays exact.
    fn from_entry(entry: &walkdir::DirEntry) -> Self {
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            path: entry.path().to_path_buf(),
            name,
            modified,
        }
    }
}

pub fn is_image_name(name: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// List the images directly inside `dir`, ordered by `mode`.
///
/// Fails with [`StillreelError::NoImages`] when nothing qualifies.
pub fn collect_images(dir: &Path, mode: SortMode) -> Result<Vec<FrameSource>> {
    let mut sources: Vec<FrameSource> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            StillreelError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("walking {}", dir.display()))
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let src = FrameSource::from_entry(&entry);
        if is_image_name(&src.name) {
            sources.push(src);
        }
    }

    if sources.is_empty() {
        return Err(StillreelError::NoImages(dir.to_path_buf()));
    }

    sort_sources(&mut sources, mode);
    debug!(count = sources.len(), ?mode, "enumerated source images");
    Ok(sources)
}

pub fn sort_sources(sources: &mut [FrameSource], mode: SortMode) {
    match mode {
        SortMode::ByName => sources.sort_by(|a, b| natural_cmp(&a.name, &b.name)),
        SortMode::ByModified => sources.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| natural_cmp(&a.name, &b.name))
        }),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Text(&'a str),
    Digits(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;
    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(make_chunk(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(digit) = in_digits {
        out.push(make_chunk(&s[start..], digit));
    }
    out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Digits(s)
    } else {
        Chunk::Text(s)
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    // Compare by magnitude without parsing, so arbitrarily long runs never overflow.
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    let a = a.chars().flat_map(char::to_lowercase);
    let b = b.chars().flat_map(char::to_lowercase);
    a.cmp(b)
}

/// Natural ordering of file names.
///
/// Digit runs compare numerically and text runs case-insensitively, so
/// `img2.png < img10.png < img11.png`. Names equal under those rules fall
/// back to plain byte order to keep the ordering total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ca = chunks(a);
    let cb = chunks(b);
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => cmp_text(x, y),
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(
            sorted(&["img11.png", "img10.png", "img2.png"]),
            vec!["img2.png", "img10.png", "img11.png"]
        );
    }

    #[test]
    fn text_is_case_insensitive() {
        assert_eq!(
            sorted(&["b1.png", "A2.png", "a1.png"]),
            vec!["a1.png", "A2.png", "b1.png"]
        );
    }

    #[test]
    fn leading_zeros_do_not_change_magnitude() {
        assert_eq!(natural_cmp("f007.png", "f7.png"), Ordering::Greater);
        assert_eq!(natural_cmp("f007.png", "f8.png"), Ordering::Less);
    }

    #[test]
    fn huge_digit_runs_do_not_overflow() {
        let big = "frame99999999999999999999999999.png";
        assert_eq!(natural_cmp("frame1.png", big), Ordering::Less);
    }

    #[test]
    fn chunking_alternates_runs() {
        assert_eq!(
            chunks("ab12c3"),
            vec![
                Chunk::Text("ab"),
                Chunk::Digits("12"),
                Chunk::Text("c"),
                Chunk::Digits("3")
            ]
        );
        assert!(chunks("").is_empty());
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        assert!(is_image_name("a.png"));
        assert!(is_image_name("a.jpeg"));
        assert!(is_image_name("a.jpg"));
        assert!(!is_image_name("a.PNG"));
        assert!(!is_image_name("a.gif"));
    }

    #[test]
    fn modified_ties_fall_back_to_name() {
        let t = SystemTime::UNIX_EPOCH;
        let mk = |name: &str| FrameSource {
            path: PathBuf::from(name),
            name: name.to_string(),
            modified: t,
        };
        let mut v = vec![mk("x10.png"), mk("x9.png")];
        sort_sources(&mut v, SortMode::ByModified);
        assert_eq!(v[0].name, "x9.png");
    }
}
