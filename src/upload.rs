use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::csv_ingest::{self, ParsedFile};
use crate::error::UploadError;

/// A parsed CSV file ready to be put in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub name: String,
    pub size: u64,
    pub last_modified_at: DateTime<Utc>,
    pub parsed: ParsedFile,
}

impl Upload {
    /// Read and parse a `.csv` file from disk. The cache key is the bare file name.
    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(UploadError::NotCsv(path.display().to_string()));
        }

        let bytes = fs::read(path)?;
        let last_modified_at = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let text = String::from_utf8(bytes).map_err(|e| UploadError::Utf8(e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let upload = Self::from_text(name, &text, last_modified_at)?;
        log::info!(
            "Read {} ({} bytes, {} rows)",
            path.display(),
            upload.size,
            upload.parsed.rows.len()
        );
        Ok(upload)
    }

    pub fn from_text(
        name: impl Into<String>,
        text: &str,
        last_modified_at: DateTime<Utc>,
    ) -> Result<Self, UploadError> {
        let parsed = csv_ingest::parse(text)?;
        Ok(Self {
            name: name.into(),
            size: text.len() as u64,
            last_modified_at,
            parsed,
        })
    }
}
