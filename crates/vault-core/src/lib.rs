//! # Vault Core
//!
//! Shared logic for Fragment Vault: data models, query-intent
//! classification types, the tri-hybrid ranking engine, session context,
//! relationship discovery, consolidation clustering, and the store
//! abstraction they all run against.
//!
//! This crate contains no tokio I/O, sqlx, or network dependencies; every
//! collaborator with side effects (persistence, embeddings, generative
//! services) sits behind a trait, and the in-memory store makes the whole
//! engine testable in isolation.

pub mod consolidate;
pub mod embedding;
pub mod error;
pub mod intent;
pub mod models;
pub mod relate;
pub mod score;
pub mod search;
pub mod session;
pub mod store;
