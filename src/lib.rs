//! Multi-sensor CSV ingestion, a persistent per-file cache and chart series
//! derivation. The terminal front end lives in [`app`].

pub mod app;
pub mod config;
pub mod csv_ingest;
pub mod error;
pub mod file_cache;
pub mod selection;
pub mod series;
pub mod store;
pub mod upload;

pub use csv_ingest::{ParsedFile, SensorReading};
pub use error::{CacheError, ConfigError, ParseError, StoreError, UploadError};
pub use file_cache::{CachePolicy, FileCache, FileRecord, PutStatus, human_file_size};
pub use selection::Selection;
pub use series::{ChartSeries, Series, build_series};
pub use upload::Upload;
