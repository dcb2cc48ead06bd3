//! Output directory handle.
//!
//! Writers receive an [`OutputDir`] and resolve file paths against it;
//! the process working directory is never changed.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Default directory for exported reports, relative to the invocation
/// directory.
pub const DEFAULT_OUTPUT_DIR: &str = "downloaded_reports";

/// Directory that receives exported PDFs.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Full path of `file_name` inside this directory.
    pub fn resolve(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Create the directory (and parents) if it does not exist yet.
    pub async fn ensure(&self) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Write `bytes` to `file_name`, creating the directory first.
    ///
    /// Returns the path that was written.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        self.ensure().await?;
        let path = self.resolve(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

impl Default for OutputDir {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_file_name() {
        let out = OutputDir::new("/tmp/reports");
        assert_eq!(
            out.resolve("1234567-8_fi-FI.pdf"),
            PathBuf::from("/tmp/reports/1234567-8_fi-FI.pdf")
        );
    }

    #[tokio::test]
    async fn write_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let out = OutputDir::new(dir.path().join("downloaded_reports"));

        let path = out.write("a_fi-FI.pdf", b"%PDF-1.5").await.unwrap();

        assert!(path.starts_with(dir.path().join("downloaded_reports")));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.5");
    }

    #[tokio::test]
    async fn write_into_existing_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let out = OutputDir::new(dir.path());

        out.write("first.pdf", b"1").await.unwrap();
        out.write("second.pdf", b"2").await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("second.pdf")).unwrap(), b"2");
    }
}
