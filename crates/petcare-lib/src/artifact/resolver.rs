//! Timestamp-based artifact discovery
//!
//! Artifacts follow `<prefix>_<YYYYMMDD_HHMMSS>.<ext>`. The resolver walks a
//! directory tree, parses the embedded timestamp and picks the newest.
//! Equal timestamps are broken by the lexicographically greatest path.

use super::store::manifest_file_name;
use crate::error::{LifecycleError, LifecycleResult};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static TIMESTAMP_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{8}_\d{6})").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preprocessor,
    Model,
    Manifest,
}

impl ArtifactKind {
    /// File extensions this kind is published under, preferred first
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Preprocessor => &["pkl"],
            Self::Model => &["txt", "bst"],
            Self::Manifest => &["json"],
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        [Self::Preprocessor, Self::Model, Self::Manifest]
            .into_iter()
            .find(|kind| kind.extensions().contains(&extension))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocessor => "preprocessor",
            Self::Model => "model",
            Self::Manifest => "manifest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    pub timestamp_tag: String,
    pub timestamp: NaiveDateTime,
    pub kind: ArtifactKind,
}

/// Extract the last `YYYYMMDD_HHMMSS` group from a file stem
pub fn parse_timestamp(stem: &str) -> Option<(String, NaiveDateTime)> {
    let pattern = TIMESTAMP_PATTERN.as_ref()?;
    pattern
        .find_iter(stem)
        .filter_map(|m| {
            NaiveDateTime::parse_from_str(m.as_str(), TIMESTAMP_FORMAT)
                .ok()
                .map(|ts| (m.as_str().to_string(), ts))
        })
        .last()
}

/// All files under `root` matching `prefix*.extension` with a parseable timestamp
pub fn scan(root: &Path, extension: &str, prefix: &str, kind: ArtifactKind) -> Vec<ArtifactDescriptor> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == extension))
        .filter_map(|e| {
            let stem = e.path().file_stem()?.to_str()?.to_string();
            if !stem.starts_with(prefix) {
                return None;
            }
            let (timestamp_tag, timestamp) = parse_timestamp(&stem)?;
            Some(ArtifactDescriptor {
                path: e.into_path(),
                timestamp_tag,
                timestamp,
                kind,
            })
        })
        .collect()
}

fn newest(candidates: Vec<ArtifactDescriptor>) -> Option<ArtifactDescriptor> {
    candidates
        .into_iter()
        .max_by(|a, b| (a.timestamp, &a.path).cmp(&(b.timestamp, &b.path)))
}

/// Newest `prefix*.extension` file under `root`, if any
///
/// Extensions outside the published artifact kinds never resolve.
pub fn resolve(root: &Path, extension: &str, prefix: &str) -> Option<PathBuf> {
    let kind = ArtifactKind::from_extension(extension)?;
    let found = newest(scan(root, extension, prefix, kind)).map(|d| d.path);
    debug!(root = %root.display(), extension, prefix, found = ?found, "Resolved artifact");
    found
}

/// Newest artifact of `kind` across all of its extensions
pub fn resolve_latest(root: &Path, kind: ArtifactKind, prefix: &str) -> LifecycleResult<ArtifactDescriptor> {
    let candidates = kind
        .extensions()
        .iter()
        .flat_map(|ext| scan(root, ext, prefix, kind))
        .collect();
    newest(candidates).ok_or_else(|| not_found(root, kind.as_str(), prefix, kind))
}

/// Preprocessor and model from the same training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    pub tag: String,
    pub preprocessor: PathBuf,
    pub model: PathBuf,
    pub manifest: Option<PathBuf>,
}

/// Newest training run with both a preprocessor and a model.
///
/// Runs are tried newest first, so a preprocessor whose model is missing
/// (interrupted publish) falls back to the previous complete run. A model
/// is never paired with a preprocessor from another run.
pub fn resolve_serving_pair(root: &Path, prefix: &str) -> LifecycleResult<ArtifactPair> {
    let mut preprocessors = scan(root, "pkl", prefix, ArtifactKind::Preprocessor);
    if preprocessors.is_empty() {
        return Err(not_found(root, ArtifactKind::Preprocessor.as_str(), prefix, ArtifactKind::Preprocessor));
    }
    preprocessors.sort_by(|a, b| (b.timestamp, &b.path).cmp(&(a.timestamp, &a.path)));

    let models: Vec<ArtifactDescriptor> = ArtifactKind::Model
        .extensions()
        .iter()
        .flat_map(|ext| scan(root, ext, prefix, ArtifactKind::Model))
        .collect();

    for preprocessor in preprocessors {
        let tag = preprocessor.timestamp_tag.clone();
        let Some(model) = models
            .iter()
            .filter(|d| d.timestamp_tag == tag)
            .max_by(|a, b| a.path.cmp(&b.path))
        else {
            warn!(tag = %tag, preprocessor = %preprocessor.path.display(), "Preprocessor has no model, skipping run");
            continue;
        };

        let manifest = preprocessor
            .path
            .parent()
            .map(|dir| dir.join(manifest_file_name(&tag)))
            .filter(|p| p.is_file());

        info!(tag = %tag, preprocessor = %preprocessor.path.display(), model = %model.path.display(), "Resolved serving pair");
        return Ok(ArtifactPair {
            tag,
            preprocessor: preprocessor.path,
            model: model.path.clone(),
            manifest,
        });
    }

    Err(not_found(root, "model for any preprocessor", prefix, ArtifactKind::Model))
}

fn not_found(root: &Path, what: &str, prefix: &str, kind: ArtifactKind) -> LifecycleError {
    LifecycleError::ArtifactNotFound {
        root: root.to_path_buf(),
        kind: what.to_string(),
        prefix: prefix.to_string(),
        extension: kind.extensions().join("|"),
    }
}
