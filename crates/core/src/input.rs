//! Business-id input source.
//!
//! The input file holds one business id per line with no header. Lines
//! are trimmed but otherwise passed through untouched: blank or malformed
//! lines become business ids like any other.

use std::path::Path;

use crate::error::CoreError;
use crate::types::ExportUnit;

/// Read the business-id file at `path`, pairing every id with `locale`.
pub async fn read_business_ids(path: &Path, locale: &str) -> Result<Vec<ExportUnit>, CoreError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::NotFound {
                entity: "business id file",
                id: path.display().to_string(),
            }
        } else {
            CoreError::Io(e)
        }
    })?;

    Ok(parse_business_ids(&content, locale))
}

/// Parse newline-delimited business ids.
pub fn parse_business_ids(content: &str, locale: &str) -> Vec<ExportUnit> {
    content
        .lines()
        .map(|line| ExportUnit::new(line.trim(), locale))
        .collect()
}
