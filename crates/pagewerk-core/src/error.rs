// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Pagewerk.

use thiserror::Error;

/// Top-level error type for all Pagewerk operations.
#[derive(Debug, Error)]
pub enum PagewerkError {
    // -- Document library errors --
    #[error("failed to parse document: {0}")]
    Parse(String),

    /// `page` is the zero-based source index; the message shows it one-based.
    #[error("failed to copy page {}: {reason}", .page + 1)]
    Copy { page: usize, reason: String },

    #[error("failed to save document: {0}")]
    Save(String),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // -- Recovery --
    #[error("all repair methods failed: {0}")]
    RepairExhausted(String),

    #[error("repair refused: {0}")]
    RepairRefused(String),

    // -- Orchestration --
    #[error("another operation is already in progress")]
    Busy,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagewerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_message_is_one_based() {
        let err = PagewerkError::Copy {
            page: 0,
            reason: "dangling contents".into(),
        };
        assert_eq!(err.to_string(), "failed to copy page 1: dangling contents");
    }
}
