//! # Site Context Core
//!
//! Shared, I/O-free logic for Site Context: data models, URL normalization,
//! search-term derivation, prompt assembly, analysis parsing, and the
//! [`store::ContextStore`] abstraction.
//!
//! This crate contains no tokio, sqlx, or HTTP client dependencies. Every
//! network collaborator (page fetchers, search API, LLM providers) lives in
//! the `site-context` crate and consumes these types.

pub mod analysis;
pub mod error;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod store;
pub mod terms;
pub mod text;

pub use error::{SiteError, SiteResult};
