// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — the lopdf document library and the printpdf image composer.

pub mod library;
pub mod writer;

pub use library::{PdfFile, PdfLibrary};
pub use writer::ImageComposer;
