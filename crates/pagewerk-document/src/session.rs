// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session-scoped orchestration context.
//
// Holds the "processing" flag that keeps a second operation from starting
// while one is in flight, and the repair history for the current input.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::SessionId;
use tracing::debug;

use crate::recovery::RecoveryCascade;

/// Context shared by every operation a user runs in one workspace.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    processing: Arc<AtomicBool>,
    repair: RecoveryCascade,
}

impl Session {
    pub fn new(max_repair_runs: u32) -> Self {
        Self {
            id: SessionId::new(),
            processing: Arc::new(AtomicBool::new(false)),
            repair: RecoveryCascade::new(max_repair_runs),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Mark an operation as started. Fails with [`PagewerkError::Busy`] if
    /// one is already running; the flag clears when the guard drops.
    pub fn begin(&self) -> Result<ProcessingGuard> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PagewerkError::Busy);
        }
        debug!(session = %self.id, "operation started");
        Ok(ProcessingGuard {
            flag: Arc::clone(&self.processing),
        })
    }

    pub fn repair(&self) -> &RecoveryCascade {
        &self.repair
    }

    pub fn repair_mut(&mut self) -> &mut RecoveryCascade {
        &mut self.repair
    }
}

/// Clears the session's processing flag on drop.
#[derive(Debug)]
pub struct ProcessingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
