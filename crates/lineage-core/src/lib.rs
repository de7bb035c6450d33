//! Core types, configuration, and error handling for the lineage workspace.
//!
//! This crate provides the shared foundation used by all other lineage crates:
//! - [`LineageError`]: unified error type using `thiserror`
//! - [`LineageConfig`]: configuration loaded from `.lineage.toml`
//! - [`LogContext`]: explicitly passed structured logging context
//! - Shared types: [`Snippet`], [`CodeLine`], [`DiffHunk`], [`ChangeType`],
//!   [`Classification`], [`LineKind`]
//! - [`text`]: comment splitting and tokenization of single diff lines

mod config;
mod error;
mod log;
pub mod text;
mod types;

pub use config::{
    CommentOnlyWeights, GraphConfig, LineageConfig, MatcherConfig, ScoreWeights,
    StructuralWeights, TextOnlyWeights,
};
pub use error::LineageError;
pub use log::LogContext;
pub use types::{
    ChangeType, Classification, CodeLine, DiffHunk, HunkHeader, LineId, LineKind, LineSign,
    Snippet, BLOCK_COMMENT, INLINE_COMMENT, NO_PROMPT, SYNTAX_ERROR_MARKER,
};

/// A convenience `Result` type for lineage operations.
pub type Result<T> = std::result::Result<T, LineageError>;
