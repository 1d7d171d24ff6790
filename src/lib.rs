//! # Corpus QA
//!
//! Confidence-gated retrieval-augmented question answering over a private
//! document corpus.
//!
//! Documents are ingested through an extract → chunk → embed → store
//! pipeline. Questions are answered by embedding the query, ranking stored
//! chunk vectors by similarity, scoring the match set into a discrete
//! confidence level, and either conditioning a language model on the
//! retrieved passages or refusing with a localized fallback when the
//! evidence is too weak.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Documents │──▶│ Extract + Chunk  │──▶│  SQLite   │
//! │ pdf/docx/ │   │ + Embed (ports)  │   │ + vectors │
//! │ text/md   │   └──────────────────┘   └────┬─────┘
//! └───────────┘                               │
//!                ┌────────────────────────────┤
//!                ▼                            ▼
//!         ┌─────────────┐             ┌──────────────┐
//!         │  Retrieval  │──confidence▶│    Answer     │
//!         │ embed+search│    gate     │ compose → LLM │
//!         └─────────────┘             └──────┬───────┘
//!                                            ▼
//!                                   ┌────────────────┐
//!                                   │  CLI  /  HTTP  │
//!                                   └────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Core data types (chunks, matches, sources) |
//! | [`chunking`] | Three-strategy document chunking |
//! | [`confidence`] | Confidence policy, score, and gating predicates |
//! | [`extract`] | Text extraction for PDF/DOCX/text uploads |
//! | [`embedding`] | Embedding service port and adapters |
//! | [`llm`] | Language-model port and adapters |
//! | [`store`] | Persistence + vector search ports, SQLite adapter |
//! | [`retrieval`] | Query → matches + confidence orchestration |
//! | [`prompt`] | Deterministic prompt composition (en/tr) |
//! | [`conversation`] | Bounded TTL conversation history |
//! | [`answer`] | Gating state machine and answer assembly |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`server`] | HTTP API |
//! | [`db`], [`migrate`] | SQLite connection and schema |

pub mod answer;
pub mod chunking;
pub mod confidence;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod store;
