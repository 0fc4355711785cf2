// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-document — Page orchestration for the Pagewerk toolkit.
//
// Merges, splits, rotates and watermarks documents through a small
// `DocumentLibrary` capability seam, recovers damaged files with a
// three-strategy cascade, and composes images onto new pages.

pub mod compose;
pub mod layout;
pub mod library;
pub mod memory;
pub mod pdf;
pub mod range;
pub mod recovery;
pub mod rotation;
pub mod session;

// Re-export the primary types so callers can use `pagewerk_document::Composer` etc.
pub use compose::{Composer, CompressionReport, SplitOutput, WatermarkContent, WatermarkSpec};
pub use library::{DocumentLibrary, LoadOptions, PageDocument, PageSize, SaveOptions};
pub use pdf::library::{PdfFile, PdfLibrary};
pub use pdf::writer::ImageComposer;
pub use range::RangeSet;
pub use recovery::{RecoveryCascade, RecoveryReport, Strategy};
pub use rotation::RotationTracker;
pub use session::Session;
