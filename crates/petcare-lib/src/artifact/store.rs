//! Atomic artifact publishing, checksums, manifests and retention

use super::resolver::{scan, ArtifactKind, TIMESTAMP_FORMAT};
use crate::error::{LifecycleError, LifecycleResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of publishing one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Write `bytes` to a temp sibling, fsync, then rename over `path`.
///
/// A concurrent directory scan never observes a partially written file
/// under the final name.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> LifecycleResult<PublishedArtifact> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| LifecycleError::io(parent, e))?;
        }
    }

    let temp_path = temp_path_for(path);
    let mut file = File::create(&temp_path).map_err(|e| LifecycleError::io(&temp_path, e))?;
    file.write_all(bytes)
        .map_err(|e| LifecycleError::io(&temp_path, e))?;
    file.sync_all()
        .map_err(|e| LifecycleError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| LifecycleError::io(path, e))?;

    debug!(path = %path.display(), size = bytes.len(), "Artifact published");
    Ok(PublishedArtifact {
        path: path.to_path_buf(),
        checksum: compute_checksum(bytes),
        size_bytes: bytes.len() as u64,
    })
}

// `.tmp` never matches an artifact extension, so scans skip it.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Timestamp tag shared by every artifact of one training run
pub fn timestamp_tag(now: NaiveDateTime) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// `<prefix>_<tag>.<ext>`
pub fn artifact_file_name(prefix: &str, tag: &str, extension: &str) -> String {
    format!("{}_{}.{}", prefix, tag, extension)
}

pub fn manifest_file_name(tag: &str) -> String {
    format!("manifest_{}.json", tag)
}

/// Checksums of both halves of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub tag: String,
    pub model_name: String,
    pub preprocessor: PublishedArtifact,
    pub model: PublishedArtifact,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ArtifactManifest {
    pub fn write(&self, dir: &Path) -> LifecycleResult<PathBuf> {
        let path = dir.join(manifest_file_name(&self.tag));
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> LifecycleResult<Self> {
        let bytes = fs::read(path).map_err(|e| LifecycleError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Verify both files still hash to the recorded checksums
    pub fn verify(&self, preprocessor: &Path, model: &Path) -> LifecycleResult<()> {
        verify_checksum(preprocessor, &self.preprocessor.checksum)?;
        verify_checksum(model, &self.model.checksum)
    }
}

pub fn verify_checksum(path: &Path, expected: &str) -> LifecycleResult<()> {
    let bytes = fs::read(path).map_err(|e| LifecycleError::io(path, e))?;
    let actual = compute_checksum(&bytes);
    if actual != expected {
        return Err(LifecycleError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Remove every training run except the newest `keep` complete ones.
///
/// A run is identified by its timestamp tag; all files sharing the tag
/// (preprocessor, model, manifest) go together. Manifests only count when
/// they record `model_name == prefix`. A run is complete when both its
/// preprocessor and model exist. Incomplete runs newer than the newest
/// complete run may still be publishing and are left alone. At least one
/// complete run is always kept. Returns the removed paths.
pub fn prune_artifacts(root: &Path, prefix: &str, keep: usize) -> LifecycleResult<Vec<PathBuf>> {
    let keep = keep.max(1);

    let mut candidates = Vec::new();
    for kind in [ArtifactKind::Preprocessor, ArtifactKind::Model] {
        for ext in kind.extensions() {
            candidates.extend(scan(root, ext, prefix, kind));
        }
    }
    candidates.extend(
        scan(root, "json", "manifest", ArtifactKind::Manifest)
            .into_iter()
            .filter(|d| manifest_belongs_to(&d.path, prefix)),
    );

    let tags_of = |kind: ArtifactKind| -> BTreeSet<&str> {
        candidates
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.timestamp_tag.as_str())
            .collect()
    };
    let preprocessor_tags = tags_of(ArtifactKind::Preprocessor);
    let model_tags = tags_of(ArtifactKind::Model);
    // Tags sort chronologically because the format is fixed-width.
    let complete: Vec<&str> = preprocessor_tags.intersection(&model_tags).copied().collect();
    let Some(newest_complete) = complete.last().copied() else {
        debug!(root = %root.display(), prefix, "No complete training run, nothing pruned");
        return Ok(Vec::new());
    };

    let retained: BTreeSet<String> = complete
        .iter()
        .rev()
        .take(keep)
        .copied()
        .chain(
            preprocessor_tags
                .union(&model_tags)
                .copied()
                .filter(|tag| *tag > newest_complete),
        )
        .map(str::to_string)
        .collect();

    let mut removed = Vec::new();
    for descriptor in candidates {
        if retained.contains(&descriptor.timestamp_tag) {
            continue;
        }
        match fs::remove_file(&descriptor.path) {
            Ok(()) => removed.push(descriptor.path),
            Err(e) => warn!(error = %e, path = %descriptor.path.display(), "Failed to prune artifact"),
        }
    }

    if !removed.is_empty() {
        info!(removed = removed.len(), kept_runs = retained.len(), "Pruned old artifacts");
    }
    Ok(removed)
}

// Unreadable manifests are never attributed to a model, so never pruned.
fn manifest_belongs_to(path: &Path, model_name: &str) -> bool {
    match ArtifactManifest::read(path) {
        Ok(manifest) => manifest.model_name == model_name,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping unreadable manifest");
            false
        }
    }
}
