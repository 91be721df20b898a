// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Error taxonomy (§7): accumulated file-author diagnostics vs. abort-on-
//! programming-error. Mirrors the split the teacher keeps between recoverable
//! `Result`-returning errors and `panic!`-based invariant violations.

use std::fmt;
use std::sync::Arc;

/// A location within a Blueprints file. `file` is an interned path so
/// `Position` stays cheap to clone into every diagnostic and template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A position with no useful file context, used for programmatically
    /// constructed entities (built-in rules, test fixtures).
    pub fn synthetic() -> Self {
        Self::new("<synthetic>", 0, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    PropertyUnknown,
    PropertyDuplicate,
    PropertyTypeMismatch,
    InvalidName,
    UnknownModuleType,
    DuplicateModule,
    UnknownDep,
    SelfDep,
    DependencyCycle,
    UnsupportedAssignment,
    InvalidSubdirsPattern,
}

/// One related location attached to a diagnostic (a back-reference to a
/// prior definition, or one edge of a reported cycle).
#[derive(Debug, Clone)]
pub struct Related {
    pub position: Position,
    pub message: String,
}

/// A single file-author-facing error (§7). `related` holds zero or more
/// supplementary locations: a duplicate-name diagnostic carries one
/// back-reference, a cycle diagnostic carries one entry per edge.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub position: Position,
    pub message: String,
    pub related: Vec<Related>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, position: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, position: Position, message: impl Into<String>) -> Self {
        self.related.push(Related {
            position,
            message: message.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.position, self.message)?;
        for related in &self.related {
            writeln!(f, "  {}: {}", related.position, related.message)?;
        }
        Ok(())
    }
}

/// Up to ten errors per phase are accumulated before the phase gives up
/// (§5, §7). Errors past the cap are silently elided, not queued.
#[derive(Debug, Default)]
pub struct ErrorSink {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorSink {
    pub const CAP: usize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the diagnostic was accepted (cap not yet reached).
    pub fn push(&mut self, diagnostic: Diagnostic) -> bool {
        if self.diagnostics.len() >= Self::CAP {
            return false;
        }
        self.diagnostics.push(diagnostic);
        true
    }

    pub fn is_full(&self) -> bool {
        self.diagnostics.len() >= Self::CAP
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Aborts the process with a structured diagnostic. Used for the
/// `ProgrammingError` cases in §7: variable-reference cycles, duplicate
/// registration within one scope, an invalid `PropertySink` kind, duplicate
/// module-info registration. These indicate caller bugs, not file-author
/// mistakes, so they are never collected as [`Diagnostic`]s.
#[track_caller]
pub fn programming_error(message: impl fmt::Display) -> ! {
    panic!("programming error: {message}");
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("{} error(s) registering packages and module types", .0.len())]
    Registration(Vec<Diagnostic>),
    #[error("{} error(s) parsing Blueprints files", .0.len())]
    Parse(Vec<Diagnostic>),
    #[error("{} error(s) resolving module dependencies", .0.len())]
    Resolve(Vec<Diagnostic>),
    #[error("{} error(s) generating build actions", .0.len())]
    Generate(Vec<Diagnostic>),
    #[error("{} error(s) writing the manifest", .0.len())]
    Write(Vec<Diagnostic>),
    #[error("write attempted before prepare_build_actions succeeded")]
    BuildActionsNotReady,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    /// All diagnostics this error carries, for uniform reporting.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            GeneratorError::Registration(d)
            | GeneratorError::Parse(d)
            | GeneratorError::Resolve(d)
            | GeneratorError::Generate(d)
            | GeneratorError::Write(d) => d,
            GeneratorError::BuildActionsNotReady | GeneratorError::Io(_) => &[],
        }
    }
}
