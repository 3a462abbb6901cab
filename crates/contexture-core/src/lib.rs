//! # Contexture Core
//!
//! Retrieval-engine library for context-augmented question answering,
//! with reference-free evaluation of the retrieval strategies it ships.
//!
//! Documents are decomposed once into a hierarchy of chunks and a windowed
//! sentence sequence, stored in an append-only [`corpus::UnitStore`]. Three
//! retrieval strategies run over the same store and capability set: direct
//! leaf retrieval, sentence-window retrieval, and auto-merging retrieval.
//! Their outputs are scored with the triad (context relevance,
//! groundedness, answer relevance) so strategy effects can be compared on
//! any corpus without gold answers.
//!
//! ## Modules
//!
//! - [`corpus`] - Unit store, corpus builder, fingerprinted snapshots
//! - [`chunking`] - Hierarchical chunker, sentence splitter, size measures
//! - [`retrieval`] - Similarity retriever, resolvers, reranker, engine façade
//! - [`capability`] - Embedder/generator/judge traits and offline stand-ins
//! - [`evaluation`] - Triad scoring, leaderboard, significance statistics
//! - [`config`] - Parameter structs and production defaults
//! - [`error`] - Error taxonomy for builds, queries, and capability calls

pub mod capability;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluation;
pub mod retrieval;
