//! Slicing a file into fixed-duration pieces and joining them back.

use std::path::{Path, PathBuf};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// File name prefix of sliced pieces.
pub const SLICE_PREFIX: &str = "fftb_out_";

/// One piece of a sliced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceFile {
    /// Concatenation order, starting at 0
    pub position: u32,
    pub path: PathBuf,
}

impl SliceFile {
    pub fn new(position: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            position,
            path: path.into(),
        }
    }
}

/// Command that cuts `input` into `segment_secs` pieces inside `out_dir`.
pub fn slice_command(input: &Path, out_dir: &Path, segment_secs: u32) -> FfmpegCommand {
    let extension = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let pattern = out_dir.join(format!("{}%06d{}", SLICE_PREFIX, extension));

    FfmpegCommand::new(input, pattern)
        .map("0")
        .copy_streams()
        .output_format("segment")
        .output_args([
            "-segment_time".to_string(),
            segment_secs.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
        ])
}

/// Position encoded in a slice file name, if it is one.
pub fn slice_position(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(SLICE_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Collect the pieces written to `dir`, ordered by position.
pub async fn collect_slices(dir: &Path) -> MediaResult<Vec<SliceFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut slices = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(position) = slice_position(&path) {
            slices.push(SliceFile::new(position, path));
        }
    }

    slices.sort_by_key(|s| s.position);
    Ok(slices)
}

/// Concat demuxer list for `slices`, ordered by position.
pub fn concat_list(slices: &[SliceFile]) -> MediaResult<String> {
    if slices.is_empty() {
        return Err(MediaError::NoSegments);
    }

    let mut sorted: Vec<&SliceFile> = slices.iter().collect();
    sorted.sort_by_key(|s| s.position);

    let lines: Vec<String> = sorted
        .iter()
        .map(|s| {
            let path = s.path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'", path)
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Command joining the files listed in `list_file` into `output` without re-encoding.
pub fn concat_command(list_file: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list_file, output)
        .input_format("concat")
        .input_arg("-safe")
        .input_arg("0")
        .copy_streams()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_position() {
        assert_eq!(slice_position(Path::new("/tmp/fftb_out_000012.mp4")), Some(12));
        assert_eq!(slice_position(Path::new("fftb_out_000000")), Some(0));
        assert_eq!(slice_position(Path::new("/tmp/other_000012.mp4")), None);
        assert_eq!(slice_position(Path::new("/tmp/fftb_out_.mp4")), None);
        assert_eq!(slice_position(Path::new("/tmp/fftb_out_12a.mp4")), None);
    }

    #[test]
    fn test_concat_list_is_ordered_and_escaped() {
        let slices = vec![
            SliceFile::new(2, "/tmp/c.mp4"),
            SliceFile::new(0, "/tmp/a.mp4"),
            SliceFile::new(1, "/tmp/it's.mp4"),
        ];

        let list = concat_list(&slices).unwrap();
        assert_eq!(
            list,
            "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\nfile '/tmp/c.mp4'"
        );

        assert!(matches!(concat_list(&[]), Err(MediaError::NoSegments)));
    }

    #[test]
    fn test_slice_command() {
        let args = slice_command(Path::new("/in/movie.mkv"), Path::new("/tmp/slices"), 10).build_args();
        assert!(args.contains(&"segment".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-segment_time" && w[1] == "10"));
        assert_eq!(args.last().unwrap(), "/tmp/slices/fftb_out_%06d.mkv");
    }

    #[tokio::test]
    async fn test_collect_slices() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["fftb_out_000001.mp4", "fftb_out_000000.mp4", "segments.txt"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let slices = collect_slices(dir.path()).await.unwrap();
        let positions: Vec<u32> = slices.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }
}
