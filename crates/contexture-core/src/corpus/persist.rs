//! Snapshot persistence for built stores.
//!
//! A snapshot is a directory holding two JSON files: `manifest.json` with
//! the schema version, fingerprint, and summary counts, and `units.json`
//! with the full store. The manifest is small and read first, so stale or
//! foreign snapshots are rejected without parsing the unit file.
//!
//! Snapshots are keyed by the corpus fingerprint: a blake3 hash over the
//! ordered (source id, text) pairs and the canonical JSON of the build
//! parameters. Any change to document content, document order, or
//! parameters changes the key, so a cache hit is always safe to reuse.

use crate::config::BuildParams;
use crate::corpus::store::UnitStore;
use crate::corpus::types::StoreManifest;
use crate::error::{BuildError, StoreError};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

/// File names inside a snapshot directory.
pub const MANIFEST_FILE: &str = "manifest.json";
pub const UNITS_FILE: &str = "units.json";

/// Computes the snapshot key for a corpus under given parameters.
///
/// Hashes each (source id, text) pair in order with NUL separators, then
/// the canonical JSON of the parameters. Returns the blake3 digest as a
/// lowercase hex string.
pub fn corpus_fingerprint(
    corpus: &[(String, String)],
    params: &BuildParams,
) -> Result<String, StoreError> {
    let mut hasher = blake3::Hasher::new();
    for (source_id, text) in corpus {
        hasher.update(source_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&serde_json::to_vec(params)?);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Writes a store snapshot into `dir`, creating the directory if needed.
///
/// The manifest is written last so a directory with a readable manifest
/// always has a complete unit file beside it.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn save(store: &UnitStore, dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;

    let units_json = serde_json::to_string(store)?;
    fs::write(dir.join(UNITS_FILE), units_json)?;

    let manifest_json = serde_json::to_string_pretty(&store.manifest())?;
    fs::write(dir.join(MANIFEST_FILE), manifest_json)?;

    info!(
        units = store.unit_count(),
        fingerprint = %store.fingerprint(),
        "snapshot saved"
    );
    Ok(())
}

/// Loads a snapshot and verifies it matches the expected fingerprint.
///
/// # Errors
///
/// - [`StoreError::IncompatibleSchema`] when the snapshot was written by a
///   build this version cannot read.
/// - [`StoreError::FingerprintMismatch`] when the snapshot belongs to a
///   different corpus or parameter set.
/// - [`BuildError::Integrity`] when the decoded store fails link
///   verification.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load(dir: &Path, expected_fingerprint: &str) -> Result<UnitStore, BuildError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_json = fs::read_to_string(&manifest_path).map_err(StoreError::Io)?;
    let manifest: StoreManifest =
        serde_json::from_str(&manifest_json).map_err(StoreError::Serialization)?;

    if !manifest.is_compatible() {
        return Err(StoreError::IncompatibleSchema {
            found: manifest.schema_version,
            current: crate::corpus::types::CURRENT_SCHEMA_VERSION,
        }
        .into());
    }
    if manifest.fingerprint != expected_fingerprint {
        return Err(StoreError::FingerprintMismatch {
            found: manifest.fingerprint,
            expected: expected_fingerprint.to_string(),
        }
        .into());
    }

    let units_path = dir.join(UNITS_FILE);
    if !units_path.exists() {
        return Err(StoreError::Incomplete(format!(
            "{UNITS_FILE} missing from snapshot"
        ))
        .into());
    }
    let units_json = fs::read_to_string(&units_path).map_err(StoreError::Io)?;
    let store: UnitStore =
        serde_json::from_str(&units_json).map_err(StoreError::Serialization)?;

    if store.fingerprint() != manifest.fingerprint {
        return Err(StoreError::Incomplete(
            "unit file fingerprint disagrees with manifest".to_string(),
        )
        .into());
    }
    store.verify_consistency()?;
    debug!(units = store.unit_count(), "snapshot loaded");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::offline::HashEmbedder;
    use crate::config::{ChunkingParams, SizeMeasure, WindowParams};
    use crate::corpus::build::CorpusBuilder;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn params() -> BuildParams {
        BuildParams {
            chunking: ChunkingParams {
                sizes: vec![200, 60],
                measure: SizeMeasure::Chars,
            },
            window: WindowParams { radius: 1 },
        }
    }

    fn corpus() -> Vec<(String, String)> {
        vec![(
            "notes.txt".to_string(),
            "Compost heats up as bacteria break down material. Turning the \
             pile adds oxygen. Finished compost smells like soil."
                .to_string(),
        )]
    }

    async fn built_store() -> UnitStore {
        CorpusBuilder::new(params(), Arc::new(HashEmbedder::new(24)))
            .unwrap()
            .build(&corpus())
            .await
            .unwrap()
    }

    #[test]
    fn test_fingerprint_changes_with_content_order_and_params() {
        let docs = corpus();
        let base = corpus_fingerprint(&docs, &params()).unwrap();

        let mut edited = corpus();
        edited[0].1.push('!');
        assert_ne!(base, corpus_fingerprint(&edited, &params()).unwrap());

        let mut two = corpus();
        two.push(("b.txt".to_string(), "More text.".to_string()));
        let mut swapped = two.clone();
        swapped.swap(0, 1);
        assert_ne!(
            corpus_fingerprint(&two, &params()).unwrap(),
            corpus_fingerprint(&swapped, &params()).unwrap(),
            "document order is part of the key"
        );

        let mut other_params = params();
        other_params.window.radius = 2;
        assert_ne!(base, corpus_fingerprint(&docs, &other_params).unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_the_store() {
        let store = built_store().await;
        let dir = TempDir::new().unwrap();

        save(&store, dir.path()).unwrap();
        let loaded = load(dir.path(), store.fingerprint()).unwrap();

        assert_eq!(loaded.fingerprint(), store.fingerprint());
        assert_eq!(loaded.unit_count(), store.unit_count());
        assert_eq!(loaded.document_count(), store.document_count());

        let texts: Vec<&str> = store.sentence_pool().map(|u| u.text.as_str()).collect();
        let loaded_texts: Vec<&str> =
            loaded.sentence_pool().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, loaded_texts, "pool order survives the round trip");
    }

    #[tokio::test]
    async fn test_wrong_fingerprint_is_rejected() {
        let store = built_store().await;
        let dir = TempDir::new().unwrap();
        save(&store, dir.path()).unwrap();

        let err = load(dir.path(), "deadbeef").expect_err("foreign snapshot");
        assert!(matches!(
            err,
            BuildError::Store(StoreError::FingerprintMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_future_schema_is_rejected() {
        let store = built_store().await;
        let dir = TempDir::new().unwrap();
        save(&store, dir.path()).unwrap();

        // Rewrite the manifest as if a much newer build produced it.
        let manifest_path = dir.path().join(MANIFEST_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        manifest["schema_version"] = serde_json::json!(99);
        manifest["min_compatible_version"] = serde_json::json!(99);
        fs::write(&manifest_path, manifest.to_string()).unwrap();

        let err = load(dir.path(), store.fingerprint()).expect_err("future schema");
        assert!(matches!(
            err,
            BuildError::Store(StoreError::IncompatibleSchema { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_unit_file_is_incomplete() {
        let store = built_store().await;
        let dir = TempDir::new().unwrap();
        save(&store, dir.path()).unwrap();
        fs::remove_file(dir.path().join(UNITS_FILE)).unwrap();

        let err = load(dir.path(), store.fingerprint()).expect_err("half a snapshot");
        assert!(matches!(err, BuildError::Store(StoreError::Incomplete(_))));
    }
}
