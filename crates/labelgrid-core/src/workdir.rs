//! Label directory: numbered intermediate label files
//!
//! Labels are written as `label_0001.pdf`, `label_0002.pdf`, ... and read
//! back in numeric order, so the order labels were extracted in is the order
//! they are composed in.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::document::LabelArtifact;
use crate::error::{LabelGridError, Result};

const PREFIX: &str = "label_";
const EXTENSION: &str = "pdf";

#[derive(Debug, Clone)]
pub struct LabelDir {
    path: PathBuf,
}

impl LabelDir {
    /// Create the directory if needed and delete any files left in it.
    /// Subdirectories are left alone.
    pub fn prepare(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.is_dir() {
            let mut removed = 0;
            for entry in read_dir(&path)? {
                if entry.is_file() {
                    fs::remove_file(&entry).map_err(|e| LabelGridError::io(&entry, e))?;
                    debug!("Deleted old file {}", entry.display());
                    removed += 1;
                }
            }
            info!("Cleared {} old files from {}", removed, path.display());
        } else {
            fs::create_dir_all(&path).map_err(|e| LabelGridError::io(&path, e))?;
            info!("Created label directory {}", path.display());
        }
        Ok(Self { path })
    }

    /// Use an existing directory as is
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(LabelGridError::NotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for the `number`-th label (1-based)
    pub fn label_path(&self, number: usize) -> PathBuf {
        self.path.join(format!("{}{:04}.{}", PREFIX, number, EXTENSION))
    }

    pub fn save(&self, number: usize, artifact: &LabelArtifact) -> Result<PathBuf> {
        let path = self.label_path(number);
        artifact.save(&path)?;
        debug!("Saved label {} to {}", number, path.display());
        Ok(path)
    }

    /// PDF files in the directory, numbered labels first in numeric order,
    /// then any other PDFs by name
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = read_dir(&self.path)?
            .into_iter()
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(EXTENSION))
            })
            .collect();
        files.sort_by(|a, b| compare_labels(a, b));
        Ok(files)
    }

    /// Lazily load every label in [`LabelDir::list`] order
    pub fn load_all(&self) -> Result<impl Iterator<Item = Result<LabelArtifact>>> {
        let files = self.list()?;
        info!("Found {} labels in {}", files.len(), self.path.display());
        Ok(files.into_iter().map(LabelArtifact::load))
    }
}

fn read_dir(path: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(path).map_err(|e| LabelGridError::from_read(path, e))?;
    entries
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| LabelGridError::io(path, e))
        })
        .collect()
}

fn label_number(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(PREFIX)?
        .parse()
        .ok()
}

fn compare_labels(a: &Path, b: &Path) -> Ordering {
    match (label_number(a), label_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
