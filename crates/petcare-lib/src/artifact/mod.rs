//! Versioned artifact store
//!
//! Publishing is write-then-rename; discovery is by the timestamp tag
//! embedded in each file name.

mod resolver;
mod store;

pub use resolver::{
    parse_timestamp, resolve, resolve_latest, resolve_serving_pair, scan, ArtifactDescriptor,
    ArtifactKind, ArtifactPair, TIMESTAMP_FORMAT,
};
pub use store::{
    artifact_file_name, compute_checksum, manifest_file_name, prune_artifacts, timestamp_tag,
    verify_checksum, write_atomic, ArtifactManifest, PublishedArtifact,
};
