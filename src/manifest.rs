use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::{StillcastError, StillcastResult};

/// One batch job: a still image, the music track laid under it, and where the
/// rendered video goes.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct ManifestRow {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
}

/// Read the three-column batch manifest (`image,audio,output`). A header row
/// with exactly those names is skipped; every other row must carry three
/// non-empty fields.
pub fn read_manifest(path: &Path) -> StillcastResult<Vec<ManifestRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open manifest '{}'", path.display()))?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record =
            record.map_err(|e| StillcastError::manifest(format!("row {line}: {e}")))?;

        if idx == 0 && is_header(&record) {
            continue;
        }
        if record.len() != 3 {
            return Err(StillcastError::manifest(format!(
                "row {line}: expected 3 fields (image,audio,output), got {}",
                record.len()
            )));
        }
        for (field, name) in record.iter().zip(["image", "audio", "output"]) {
            if field.is_empty() {
                return Err(StillcastError::manifest(format!(
                    "row {line}: empty '{name}' field"
                )));
            }
        }

        rows.push(ManifestRow {
            image: PathBuf::from(&record[0]),
            audio: PathBuf::from(&record[1]),
            output: PathBuf::from(&record[2]),
        });
    }

    if rows.is_empty() {
        return Err(StillcastError::manifest(format!(
            "manifest '{}' contains no jobs",
            path.display()
        )));
    }
    Ok(rows)
}

/// Check every row's input files before any rendering starts, so a typo in a
/// late row cannot waste the earlier renders.
pub fn verify_inputs(rows: &[ManifestRow]) -> StillcastResult<()> {
    for (idx, row) in rows.iter().enumerate() {
        for (path, name) in [(&row.image, "image"), (&row.audio, "audio")] {
            if !path.is_file() {
                return Err(StillcastError::manifest(format!(
                    "row {}: {name} file '{}' does not exist",
                    idx + 1,
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

fn is_header(record: &csv::StringRecord) -> bool {
    record.len() == 3
        && record[0].eq_ignore_ascii_case("image")
        && record[1].eq_ignore_ascii_case("audio")
        && record[2].eq_ignore_ascii_case("output")
}

/// Deterministic listing of files in `dir` with extension `ext` (without the
/// dot, compared case-insensitively), sorted by file name.
pub fn files_from_directory(dir: &Path, ext: &str) -> StillcastResult<Vec<PathBuf>> {
    let ext = ext.trim_start_matches('.');
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory '{}'", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read directory entry in '{}'", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let dir = PathBuf::from("target").join("manifest_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_rows_and_skips_header() {
        let path = write_temp(
            "ok.csv",
            "image,audio,output\nimg/a.png,music/a.mp3,out/a.mp4\nimg/b.png,music/b.mp3,out/b.mp4\n",
        );
        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].image, PathBuf::from("img/a.png"));
        assert_eq!(rows[1].output, PathBuf::from("out/b.mp4"));
    }

    #[test]
    fn headerless_manifest_is_accepted() {
        let path = write_temp("noheader.csv", "img/a.png,music/a.mp3,out/a.mp4\n");
        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn wrong_field_count_names_the_row() {
        let path = write_temp(
            "short.csv",
            "img/a.png,music/a.mp3,out/a.mp4\nimg/b.png,music/b.mp3\n",
        );
        let err = read_manifest(&path).unwrap_err().to_string();
        assert!(err.contains("row 2"), "{err}");
        assert!(err.contains("3 fields"), "{err}");
    }

    #[test]
    fn empty_field_is_rejected() {
        let path = write_temp("empty.csv", "img/a.png,,out/a.mp4\n");
        let err = read_manifest(&path).unwrap_err().to_string();
        assert!(err.contains("empty 'audio' field"), "{err}");
    }

    #[test]
    fn header_only_manifest_is_rejected() {
        let path = write_temp("header_only.csv", "image,audio,output\n");
        assert!(read_manifest(&path).is_err());
    }

    #[test]
    fn verify_inputs_names_the_row_with_a_missing_file() {
        let dir = PathBuf::from("target").join("manifest_tests").join("inputs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.png"), b"img").unwrap();
        std::fs::write(dir.join("a.mp3"), b"mp3").unwrap();

        let ok_row = ManifestRow {
            image: dir.join("a.png"),
            audio: dir.join("a.mp3"),
            output: dir.join("a.mp4"),
        };
        verify_inputs(std::slice::from_ref(&ok_row)).unwrap();

        let bad_row = ManifestRow {
            image: dir.join("a.png"),
            audio: dir.join("nope.mp3"),
            output: dir.join("b.mp4"),
        };
        let err = verify_inputs(&[ok_row, bad_row]).unwrap_err().to_string();
        assert!(err.contains("row 2"), "{err}");
        assert!(err.contains("audio file"), "{err}");
        assert!(err.contains("does not exist"), "{err}");
    }

    #[test]
    fn directory_listing_filters_and_sorts() {
        let dir = PathBuf::from("target").join("manifest_tests").join("listing");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.JPEG", "a.jpeg", "c.mp3", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let files = files_from_directory(&dir, ".jpeg").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPEG"]);

        let tracks = files_from_directory(&dir, "mp3").unwrap();
        assert_eq!(tracks.len(), 1);
    }
}
