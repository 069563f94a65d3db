//! Collision-free output file naming.

use std::path::{Path, PathBuf};

pub const OUTPUT_EXTENSION: &str = "mp4";

/// Base name for videos made from `first_image`: its file stem plus `_output`.
pub fn output_base_name(first_image: &Path) -> String {
    let stem = first_image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stillreel");
    format!("{}_output", stem)
}

/// First free `{base}_{n}.mp4` inside `dir`, counting `n` up from 0.
pub fn unique_output_path(dir: &Path, base_name: &str) -> PathBuf {
    (0u64..)
        .map(|n| dir.join(format!("{}_{}.{}", base_name, n, OUTPUT_EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join(format!("{}.{}", base_name, OUTPUT_EXTENSION)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn base_name_uses_stem() {
        assert_eq!(output_base_name(Path::new("/tmp/frame1.png")), "frame1_output");
        assert_eq!(output_base_name(Path::new("shot.final.jpeg")), "shot.final_output");
    }

    #[test]
    fn first_candidate_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let p = unique_output_path(dir.path(), "frame1_output");
        assert_eq!(p, dir.path().join("frame1_output_0.mp4"));
    }

    #[test]
    fn skips_existing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        for n in 0..3 {
            fs::write(dir.path().join(format!("frame1_output_{}.mp4", n)), b"").unwrap();
        }
        let p = unique_output_path(dir.path(), "frame1_output");
        assert_eq!(p, dir.path().join("frame1_output_3.mp4"));
    }

    #[test]
    fn gaps_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_output_1.mp4"), b"").unwrap();
        assert_eq!(
            unique_output_path(dir.path(), "a_output"),
            dir.path().join("a_output_0.mp4")
        );
    }
}
