//! Append-only arena of units and documents.
//!
//! The [`UnitStore`] owns every unit built from a corpus. During a build the
//! corpus builder appends documents and units; after verification the store
//! is read-only and safe to share across engines and query tasks without
//! locking. Lookups are by [`UnitId`]; the two retrieval pools (leaf chunks,
//! sentences) are materialized in corpus order at build time so ranking ties
//! can be broken deterministically.

use crate::config::BuildParams;
use crate::corpus::types::{
    CURRENT_SCHEMA_VERSION, DocumentId, DocumentRecord, StoreManifest, Unit, UnitId, UnitKind,
    current_timestamp,
};
use crate::error::IntegrityError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Arena of immutable units plus their owning documents.
///
/// Constructed by `CorpusBuilder`; external code only reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnitStore {
    params: BuildParams,
    fingerprint: String,
    embedding_dimension: usize,
    documents: Vec<DocumentRecord>,
    units: BTreeMap<UnitId, Unit>,
    /// Leaf-chunk ids in corpus order (document order, then text order).
    leaf_pool: Vec<UnitId>,
    /// Sentence ids in corpus order.
    sentence_pool: Vec<UnitId>,
    next_unit_id: u64,
}

impl UnitStore {
    /// Creates an empty store bound to one parameter set and fingerprint.
    pub(crate) fn new(params: BuildParams, fingerprint: String) -> Self {
        Self {
            params,
            fingerprint,
            embedding_dimension: 0,
            documents: Vec::new(),
            units: BTreeMap::new(),
            leaf_pool: Vec::new(),
            sentence_pool: Vec::new(),
            next_unit_id: 0,
        }
    }

    /// Mints the next unit id. Ids are dense and build-order sequential.
    pub(crate) fn mint_unit_id(&mut self) -> UnitId {
        let id = UnitId::from_u64(self.next_unit_id);
        self.next_unit_id += 1;
        id
    }

    /// Appends a unit to the arena and registers it in its retrieval pool.
    pub(crate) fn insert_unit(&mut self, unit: Unit) {
        match unit.kind {
            UnitKind::LeafChunk => self.leaf_pool.push(unit.id),
            UnitKind::Sentence => self.sentence_pool.push(unit.id),
            UnitKind::ParentChunk => {}
        }
        self.units.insert(unit.id, unit);
    }

    /// Appends a document record. The caller has already inserted its units.
    pub(crate) fn insert_document(&mut self, record: DocumentRecord) {
        self.documents.push(record);
    }

    /// Mints the id for the next document to be appended.
    pub(crate) fn next_document_id(&self) -> DocumentId {
        DocumentId::from_u64(self.documents.len() as u64)
    }

    /// Records the embedding dimension observed during the build.
    pub(crate) fn set_embedding_dimension(&mut self, dimension: usize) {
        self.embedding_dimension = dimension;
    }

    /// Looks up a unit by id.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Looks up a document by id.
    pub fn document(&self, id: DocumentId) -> Option<&DocumentRecord> {
        self.documents.get(id.as_u64() as usize)
    }

    /// All documents in corpus order.
    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    /// Number of units in the arena.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Leaf-chunk units in corpus order; the direct and auto-merging
    /// retrieval pool.
    pub fn leaf_pool(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.leaf_pool.iter().filter_map(|id| self.units.get(id))
    }

    /// Sentence units in corpus order; the sentence-window retrieval pool.
    pub fn sentence_pool(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.sentence_pool.iter().filter_map(|id| self.units.get(id))
    }

    /// Parameters this store was built with.
    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    /// Fingerprint of (corpus, build parameters).
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Embedding dimension of retrievable units (0 before any embedding).
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    /// Builds the manifest describing this store for snapshotting.
    pub fn manifest(&self) -> StoreManifest {
        StoreManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            min_compatible_version: 1,
            fingerprint: self.fingerprint.clone(),
            params: self.params.clone(),
            document_count: self.documents.len(),
            unit_count: self.units.len(),
            embedding_dimension: self.embedding_dimension,
            created_at: current_timestamp(),
        }
    }

    /// Verifies bidirectional parent/child consistency and window sanity
    /// for every unit in the arena.
    ///
    /// Run at the end of every build and after every snapshot load; a store
    /// that fails here is discarded, never queried.
    ///
    /// # Errors
    ///
    /// Returns the first [`IntegrityError`] found. The check is exhaustive
    /// per unit but stops at the first violation, which is enough to abort
    /// a build with a precise message.
    pub fn verify_consistency(&self) -> Result<(), IntegrityError> {
        for unit in self.units.values() {
            if let Some(parent_id) = unit.parent_id {
                let parent = self.units.get(&parent_id).ok_or(IntegrityError::MissingParent {
                    unit: unit.id,
                    parent: parent_id,
                })?;
                if !parent.child_ids.contains(&unit.id) {
                    return Err(IntegrityError::ParentLinkNotMirrored {
                        child: unit.id,
                        parent: parent_id,
                    });
                }
            }
            for &child_id in &unit.child_ids {
                let child = self.units.get(&child_id).ok_or(IntegrityError::MissingChild {
                    unit: unit.id,
                    child: child_id,
                })?;
                if child.parent_id != Some(unit.id) {
                    return Err(IntegrityError::ChildLinkNotMirrored {
                        parent: unit.id,
                        child: child_id,
                        actual: child.parent_id,
                    });
                }
            }
            if let Some(window) = &unit.window {
                for &member_id in window {
                    let member = self
                        .units
                        .get(&member_id)
                        .filter(|m| m.kind == UnitKind::Sentence && m.doc == unit.doc);
                    let Some(member) = member else {
                        return Err(IntegrityError::InvalidWindowMember {
                            unit: unit.id,
                            member: member_id,
                        });
                    };
                    // The window resolver slices the document's sentence
                    // sequence by member ordinals, so every member must sit
                    // at its ordinal in that sequence.
                    let indexed = self
                        .document(member.doc)
                        .and_then(|doc| doc.sentence_ids.get(member.ordinal))
                        .is_some_and(|&id| id == member_id);
                    if !indexed {
                        return Err(IntegrityError::WindowMemberNotIndexed {
                            unit: unit.id,
                            member: member_id,
                            ordinal: member.ordinal,
                        });
                    }
                }
            }
        }
        debug!(
            units = self.units.len(),
            documents = self.documents.len(),
            "store consistency verified"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn unit_mut_for_test(&mut self, id: UnitId) -> &mut Unit {
        self.units.get_mut(&id).expect("test unit exists")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::types::ByteSpan;

    /// Builds a minimal verified store: one document, one root with two
    /// leaf children, two sentences with trivial windows.
    fn small_store() -> UnitStore {
        let mut store = UnitStore::new(BuildParams::default(), "test-fp".to_string());
        let doc = store.next_document_id();

        let root_id = store.mint_unit_id();
        let leaf_a = store.mint_unit_id();
        let leaf_b = store.mint_unit_id();
        let sent_a = store.mint_unit_id();
        let sent_b = store.mint_unit_id();

        store.insert_unit(Unit {
            id: root_id,
            doc,
            kind: UnitKind::ParentChunk,
            level: 0,
            ordinal: 0,
            text: "First part. Second part.".to_string(),
            span: ByteSpan::new(0, 24),
            embedding: None,
            window: None,
            parent_id: None,
            child_ids: vec![leaf_a, leaf_b],
        });
        store.insert_unit(Unit {
            id: leaf_a,
            doc,
            kind: UnitKind::LeafChunk,
            level: 1,
            ordinal: 0,
            text: "First part.".to_string(),
            span: ByteSpan::new(0, 11),
            embedding: Some(vec![1.0, 0.0]),
            window: None,
            parent_id: Some(root_id),
            child_ids: Vec::new(),
        });
        store.insert_unit(Unit {
            id: leaf_b,
            doc,
            kind: UnitKind::LeafChunk,
            level: 1,
            ordinal: 1,
            text: "Second part.".to_string(),
            span: ByteSpan::new(12, 24),
            embedding: Some(vec![0.0, 1.0]),
            window: None,
            parent_id: Some(root_id),
            child_ids: Vec::new(),
        });
        store.insert_unit(Unit {
            id: sent_a,
            doc,
            kind: UnitKind::Sentence,
            level: 0,
            ordinal: 0,
            text: "First part.".to_string(),
            span: ByteSpan::new(0, 11),
            embedding: Some(vec![1.0, 0.0]),
            window: Some(vec![sent_a, sent_b]),
            parent_id: None,
            child_ids: Vec::new(),
        });
        store.insert_unit(Unit {
            id: sent_b,
            doc,
            kind: UnitKind::Sentence,
            level: 0,
            ordinal: 1,
            text: "Second part.".to_string(),
            span: ByteSpan::new(12, 24),
            embedding: Some(vec![0.0, 1.0]),
            window: Some(vec![sent_a, sent_b]),
            parent_id: None,
            child_ids: Vec::new(),
        });
        store.insert_document(DocumentRecord {
            id: doc,
            source_id: "doc-0".to_string(),
            text: "First part. Second part.".to_string(),
            root_ids: vec![root_id],
            sentence_ids: vec![sent_a, sent_b],
        });
        store.set_embedding_dimension(2);
        store
    }

    #[test]
    fn test_well_formed_store_verifies() {
        small_store().verify_consistency().expect("store is consistent");
    }

    #[test]
    fn test_pools_preserve_corpus_order() {
        let store = small_store();
        let leaves: Vec<u64> = store.leaf_pool().map(|u| u.id.as_u64()).collect();
        assert_eq!(leaves, vec![1, 2], "leaf pool follows insertion order");
        let sentences: Vec<u64> = store.sentence_pool().map(|u| u.id.as_u64()).collect();
        assert_eq!(sentences, vec![3, 4]);
    }

    #[test]
    fn test_parent_chunks_stay_out_of_pools() {
        let store = small_store();
        assert!(
            store.leaf_pool().all(|u| u.kind == UnitKind::LeafChunk),
            "only leaf chunks in the leaf pool"
        );
        assert_eq!(store.unit_count(), 5);
    }

    #[test]
    fn test_dangling_parent_is_detected() {
        let mut store = small_store();
        store.unit_mut_for_test(UnitId::from_u64(3)).parent_id = Some(UnitId::from_u64(99));
        let err = store.verify_consistency().expect_err("dangling parent");
        assert!(matches!(err, IntegrityError::MissingParent { .. }), "{err:?}");
    }

    #[test]
    fn test_unmirrored_parent_link_is_detected() {
        let mut store = small_store();
        // A sentence now claims a leaf chunk as parent; that unit exists
        // but does not list the sentence as a child.
        store.unit_mut_for_test(UnitId::from_u64(3)).parent_id = Some(UnitId::from_u64(2));
        let err = store.verify_consistency().expect_err("unmirrored link");
        assert!(
            matches!(err, IntegrityError::ParentLinkNotMirrored { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_unmirrored_child_link_is_detected() {
        let mut store = small_store();
        store.unit_mut_for_test(UnitId::from_u64(2)).parent_id = None;
        let err = store.verify_consistency().expect_err("child without backlink");
        assert!(
            matches!(
                err,
                IntegrityError::ChildLinkNotMirrored { actual: None, .. }
            ),
            "{err:?}"
        );
    }

    #[test]
    fn test_foreign_window_member_is_detected() {
        let mut store = small_store();
        // Point a sentence window at a leaf chunk.
        store.unit_mut_for_test(UnitId::from_u64(3)).window =
            Some(vec![UnitId::from_u64(1)]);
        let err = store.verify_consistency().expect_err("non-sentence window member");
        assert!(
            matches!(err, IntegrityError::InvalidWindowMember { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_misindexed_window_ordinal_is_detected() {
        let mut store = small_store();
        // The sentence still exists in the right document, but its ordinal
        // points past the document's sentence sequence.
        store.unit_mut_for_test(UnitId::from_u64(3)).ordinal = 7;
        let err = store.verify_consistency().expect_err("ordinal out of range");
        assert!(
            matches!(err, IntegrityError::WindowMemberNotIndexed { ordinal: 7, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_manifest_reflects_store_shape() {
        let store = small_store();
        let manifest = store.manifest();
        assert_eq!(manifest.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(manifest.unit_count, 5);
        assert_eq!(manifest.document_count, 1);
        assert_eq!(manifest.fingerprint, "test-fp");
        assert_eq!(manifest.embedding_dimension, 2);
        assert!(manifest.is_compatible());
    }
}
