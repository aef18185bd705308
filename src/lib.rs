//! # Site Context
//!
//! Website context analysis for a marketing "AI playground": scrape a
//! user-supplied URL, enrich it with competitive search results, synthesize
//! a marketing analysis with an LLM, persist it with a freshness-window
//! cache, and answer questions grounded in the stored analysis. Lead,
//! consultation-request, and case-study records are served alongside.
//!
//! ## Architecture
//!
//! ```text
//!  POST /context/analyze
//!          │
//!          ▼
//!  ┌──────────────┐  spawn  ┌──────────────────────────────────────────┐
//!  │ AnalysisQueue│ ──────▶ │ ContextPipeline                          │
//!  └──────┬───────┘         │ fetch ▶ terms ▶ search ▶ synthesize      │
//!         │ cache hit       └───────────────────┬──────────────────────┘
//!         ▼                                     ▼
//!  ┌──────────────┐                     ┌──────────────┐
//!  │ ContextStore │ ◀─────────────────  │ complete/fail│
//!  │   (SQLite)   │                     └──────────────┘
//!  └──────┬───────┘
//!         │ completed
//!         ▼
//!  ┌──────────────┐    ┌──────────────┐
//!  │ ContextChat  │ ─▶ │ LLM backends │
//!  └──────────────┘    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and API keys |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite `ContextStore` |
//! | [`extract`] / [`fetch`] | HTML extraction and page fetch strategies |
//! | [`search`] | Competitive search client |
//! | [`llm`] | OpenAI, Anthropic, and OpenRouter backends |
//! | [`deriver`] / [`synthesis`] | LLM-backed term derivation and analysis |
//! | [`pipeline`] / [`tasks`] | Analysis pipeline and its background queue |
//! | [`chat`] | Context-grounded chat |
//! | [`leads`] / [`consultations`] / [`case_studies`] | Record keeping |
//! | [`assist`] | Quick chat and marketing content |
//! | [`services`] | Service wiring |
//! | [`server`] | HTTP API |
//!
//! Pure logic (models, normalization, prompts, deterministic terms) lives in
//! the `site-context-core` crate.

pub mod assist;
#[cfg(feature = "browser")]
pub mod browser;
pub mod case_studies;
pub mod chat;
pub mod config;
pub mod consultations;
pub mod db;
pub mod deriver;
pub mod extract;
pub mod fetch;
pub mod leads;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod synthesis;
pub mod tasks;
