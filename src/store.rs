use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::types::{CrawlError, ProfileRecord};

/// On-disk representation of a dataset. JSON is the default; YAML is the
/// alternate structured form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yml",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(anyhow::anyhow!("unsupported output format {}", other)),
        }
    }
}

pub fn dataset_path(dir: &Path, name: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", name, format.extension()))
}

/// Loads the prior dataset for `name`, probing the JSON file first and the
/// YAML one second. A missing file means no prior dataset; anything else
/// that goes wrong is a persistence failure the caller must see.
pub fn load(dir: &Path, name: &str) -> Result<Option<ProfileRecord>> {
    for format in [OutputFormat::Json, OutputFormat::Yaml] {
        let path = dataset_path(dir, name, format);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(CrawlError::PersistenceFailed(format!(
                    "could not read {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };
        let record = match format {
            OutputFormat::Json => serde_json::from_str(&raw).map_err(|e| {
                CrawlError::PersistenceFailed(format!("could not parse {}: {}", path.display(), e))
            })?,
            OutputFormat::Yaml => serde_yaml::from_str(&raw).map_err(|e| {
                CrawlError::PersistenceFailed(format!("could not parse {}: {}", path.display(), e))
            })?,
        };
        debug!("prior dataset loaded from {}", path.display());
        return Ok(Some(record));
    }
    Ok(None)
}

/// Writes the merged record for `name`, overwriting any previous dataset in
/// the same format. Returns the path written to.
pub fn save(
    dir: &Path,
    name: &str,
    record: &ProfileRecord,
    format: OutputFormat,
) -> Result<PathBuf> {
    let path = dataset_path(dir, name, format);
    let serialized = match format {
        OutputFormat::Json => serde_json::to_string_pretty(record)
            .context("could not serialize the dataset to JSON")?,
        OutputFormat::Yaml => {
            serde_yaml::to_string(record).context("could not serialize the dataset to YAML")?
        }
    };
    fs::write(&path, serialized).map_err(|e| {
        CrawlError::PersistenceFailed(format!("could not write {}: {}", path.display(), e))
    })?;
    Ok(path)
}
