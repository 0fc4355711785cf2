// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Severity drives how the CLI presents the failure.

use crate::error::PagewerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Trying again may help.
    Transient,
    /// User must do something (pick another file, fix an argument).
    ActionRequired,
    /// Cannot be fixed by retrying.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether running the same command again could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `PagewerkError` into a `HumanError`.
pub fn humanize_error(err: &PagewerkError) -> HumanError {
    match err {
        PagewerkError::Parse(detail) => {
            if detail.to_ascii_lowercase().contains("encrypt") {
                HumanError {
                    message: "This PDF is password protected.".into(),
                    suggestion: "Remove the password in the program that created it, then try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "This file couldn't be read as a PDF.".into(),
                    suggestion: "The file may be damaged. Try `pagewerk repair` on it first, or choose another file.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            }
        }

        PagewerkError::Copy { page, .. } => HumanError {
            message: format!("Page {} couldn't be copied.", page + 1),
            suggestion: "That page may be damaged. Try `pagewerk repair` to salvage the readable pages.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagewerkError::Save(detail) => HumanError {
            message: "The result couldn't be saved.".into(),
            suggestion: format!("Nothing was written. Try again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::PageOutOfRange { count, .. } => HumanError {
            message: "That page doesn't exist in this document.".into(),
            suggestion: format!("The document has {count} pages. Pages are numbered from 1."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagewerkError::Image(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagewerkError::InvalidInput(detail) => HumanError {
            message: "Some of the options don't look right.".into(),
            suggestion: format!("Check the command and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagewerkError::RepairExhausted(_) => HumanError {
            message: "PDF repair failed.".into(),
            suggestion: "The file may be too badly damaged to recover. Try again, or look for another copy of the original.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::RepairRefused(detail) => HumanError {
            message: "Repair won't be attempted again.".into(),
            suggestion: format!("{detail}. Choose a different file to start over."),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagewerkError::Busy => HumanError {
            message: "Another operation is still running.".into(),
            suggestion: "Wait for it to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "Pagewerk doesn't have permission to use that file.".into(),
                    suggestion: "Check the file permissions, or try copying the file to a different location first.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, your disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        PagewerkError::Serialization(_) => HumanError {
            message: "A settings or data file couldn't be understood.".into(),
            suggestion: "Check the config file is valid JSON, or delete it to go back to defaults.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_parse_is_action_required() {
        let err = PagewerkError::Parse("document is encrypted".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("password"));
    }

    #[test]
    fn exhausted_repair_is_retriable() {
        let human = humanize_error(&PagewerkError::RepairExhausted("bad xref".into()));
        assert!(human.retriable);
    }

    #[test]
    fn refused_repair_is_permanent() {
        let human = humanize_error(&PagewerkError::RepairRefused("limit reached".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }

    #[test]
    fn copy_error_reports_one_based_page() {
        let err = PagewerkError::Copy {
            page: 2,
            reason: "missing object".into(),
        };
        assert!(humanize_error(&err).message.contains("Page 3"));
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = PagewerkError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }
}
