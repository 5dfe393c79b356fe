use std::fs;
use std::path::{Path, PathBuf};

use crate::orbit::error::TleLoadError;
use crate::orbit::OrbitalElement;

/// Reads element sets from a directory of `.tle` / `.txt` files.
///
/// The file stem is used as the constellation tag.
#[derive(Debug, Clone)]
pub struct TleLoader {
    tle_dir: PathBuf,
}

impl TleLoader {
    pub fn new(tle_dir: PathBuf) -> Self {
        Self { tle_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.tle_dir
    }

    /// Every element set of every file, in file name order. Files that fail
    /// to parse are logged and left out.
    pub fn load_all(&self) -> Result<Vec<OrbitalElement>, TleLoadError> {
        if !self.tle_dir.is_dir() {
            let shown = self.tle_dir.display().to_string();
            return Err(TleLoadError::DirectoryNotFound(shown));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.tle_dir)? {
            let path = entry?.path();
            let is_tle = path
                .extension()
                .is_some_and(|ext| ext == "tle" || ext == "txt");
            if path.is_file() && is_tle {
                paths.push(path);
            }
        }
        // directory order is platform dependent
        paths.sort();

        let mut elements = Vec::new();
        for path in paths {
            match read_element_file(&path) {
                Ok(parsed) => {
                    log::debug!("{}: {} element sets", path.display(), parsed.len());
                    elements.extend(parsed);
                }
                Err(e) => log::warn!("Skipping element file {}: {}", path.display(), e),
            }
        }
        Ok(elements)
    }
}

fn read_element_file(path: &Path) -> Result<Vec<OrbitalElement>, TleLoadError> {
    let text = fs::read_to_string(path)?;
    let constellation = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    let invalid = |message: String| TleLoadError::InvalidTle {
        file: path.display().to_string(),
        message,
    };

    parse_multi_tle(&text)
        .into_iter()
        .map(|(name, line1, line2)| {
            OrbitalElement::from_tle(name, &line1, &line2, constellation.clone())
                .map_err(|e| invalid(e.to_string()))
        })
        .collect()
}

/// Split text into `(name, line1, line2)` triples, accepting 2- and 3-line sets.
pub fn parse_multi_tle(content: &str) -> Vec<(Option<String>, String, String)> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let is_pair = |a: &str, b: &str| a.starts_with("1 ") && b.starts_with("2 ");

    let mut sets = Vec::new();
    let mut rest = lines.as_slice();
    loop {
        rest = match rest {
            [l1, l2, tail @ ..] if is_pair(*l1, *l2) => {
                sets.push((None, l1.to_string(), l2.to_string()));
                tail
            }
            [name, l1, l2, tail @ ..] if is_pair(*l1, *l2) => {
                let name = name.strip_prefix("0 ").unwrap_or(*name);
                sets.push((Some(name.to_string()), l1.to_string(), l2.to_string()));
                tail
            }
            [_, tail @ ..] => tail,
            [] => break,
        };
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::element::tests::{ISS_LINE1, ISS_LINE2};
    use crate::orbit::SatelliteId;

    #[test]
    fn splits_named_and_unnamed_sets() {
        let text = format!("ISS (ZARYA)\n{ISS_LINE1}\n{ISS_LINE2}\n\n{ISS_LINE1}\n{ISS_LINE2}\n");
        let sets = parse_multi_tle(&text);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].0.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(sets[1].0, None);
    }

    #[test]
    fn loads_directory_and_tags_constellation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("station.tle"),
            format!("ISS\n{ISS_LINE1}\n{ISS_LINE2}\n"),
        )
        .unwrap();
        fs::write(dir.path().join("broken.tle"), "1 garbage\n2 garbage\n").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let elements = TleLoader::new(dir.path().to_path_buf()).load_all().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].satellite_id, SatelliteId(25544));
        assert_eq!(elements[0].constellation.as_deref(), Some("station"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = TleLoader::new(PathBuf::from("/nonexistent/tle")).load_all();
        assert!(matches!(err, Err(TleLoadError::DirectoryNotFound(_))));
    }
}
