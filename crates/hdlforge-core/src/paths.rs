//! Output directory management for build pipelines.
//!
//! Every pipeline stage consumes the same four-directory layout,
//! ensuring tools scribble their intermediate files in a private
//! temporary directory while logs and final artifacts land in
//! predictable places.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// The four independent directories threaded through every pipeline stage.
///
/// Pure configuration; no stage owns any of these directories, and the
/// caller is responsible for cleaning the temporary directory between
/// runs. Two concurrent pipeline runs must never share a temporary
/// directory.
#[derive(Debug, Clone)]
pub struct OutputPath {
    /// Directory of the working project.
    pub working_dir: PathBuf,

    /// Directory where generated single-use files are placed.
    pub temporary_dir: PathBuf,

    /// Directory where logs and reports are placed.
    pub log_dir: PathBuf,

    /// Directory for final artifacts (netlists, bitstreams, executables).
    pub output_dir: PathBuf,
}

impl OutputPath {
    /// Build the conventional layout under a single root:
    ///
    /// ```text
    /// root/
    /// ├── temp/
    /// ├── logs/
    /// └── output/
    /// ```
    ///
    /// Creates all directories if they don't exist.
    pub fn scoped(root: &Path) -> Result<Self> {
        let paths = Self {
            working_dir: root.to_path_buf(),
            temporary_dir: root.join("temp"),
            log_dir: root.join("logs"),
            output_dir: root.join("output"),
        };

        fs::create_dir_all(&paths.working_dir)?;
        fs::create_dir_all(&paths.temporary_dir)?;
        fs::create_dir_all(&paths.log_dir)?;
        fs::create_dir_all(&paths.output_dir)?;

        Ok(paths)
    }

    /// Copy a report file into the log directory.
    ///
    /// A missing source is not an error; tools skip some reports
    /// depending on their options. Returns the target path when the
    /// copy happened.
    pub fn copy_log_file(&self, source: &Path) -> Result<Option<PathBuf>> {
        self.copy_into(source, &self.log_dir)
    }

    /// Copy an artifact file into the output directory.
    ///
    /// A missing source is not an error; a failed stage leaves its
    /// artifact behind and the stage result reports that separately.
    pub fn copy_output_file(&self, source: &Path) -> Result<Option<PathBuf>> {
        self.copy_into(source, &self.output_dir)
    }

    fn copy_into(&self, source: &Path, target_dir: &Path) -> Result<Option<PathBuf>> {
        if !source.is_file() {
            return Ok(None);
        }
        let Some(file_name) = source.file_name() else {
            return Ok(None);
        };
        let target = target_dir.join(file_name);
        fs::copy(source, &target)?;
        tracing::debug!("copied '{}' to {}", file_name.to_string_lossy(), target_dir.display());
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scoped_creates_directories() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = OutputPath::scoped(&temp.path().join("build")).expect("scoped layout");

        assert!(paths.temporary_dir.is_dir());
        assert!(paths.log_dir.is_dir());
        assert!(paths.output_dir.is_dir());
    }

    #[test]
    fn copies_into_log_and_output() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = OutputPath::scoped(temp.path()).expect("scoped layout");

        let report = paths.temporary_dir.join("top.mrp");
        fs::write(&report, "report").expect("write report");

        let copied = paths.copy_log_file(&report).expect("copy log");
        assert_eq!(copied, Some(paths.log_dir.join("top.mrp")));

        let copied = paths.copy_output_file(&report).expect("copy output");
        assert_eq!(copied, Some(paths.output_dir.join("top.mrp")));
    }

    #[test]
    fn missing_source_is_not_an_error() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = OutputPath::scoped(temp.path()).expect("scoped layout");

        let copied = paths
            .copy_log_file(&paths.temporary_dir.join("nope.log"))
            .expect("copy");
        assert!(copied.is_none());
    }
}
