//! Scratch locations for pipeline runs

use std::path::PathBuf;
use tempfile::TempDir;

/// Input, output and labels paths inside one temporary directory
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn input(&self) -> PathBuf {
        self.dir.path().join("in.pdf")
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("final.pdf")
    }

    pub fn labels(&self) -> PathBuf {
        self.dir.path().join("labels")
    }
}
