//! Diagnostics: the process-wide sink for compiler errors and warnings.
//!
//! Unlike `front::parse::ParseError`-style errors in the teacher crate, a
//! single bad statement here must not stop the walk: every subsequent
//! construct still gets a chance to report its own diagnostics. Lowering
//! helpers hand back a best-effort sentinel and push onto this sink rather
//! than returning `Result`.

use derive_more::Display;
use log::trace;
use std::cell::RefCell;

/// One error or warning, with an optional source line.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Diagnostic {
    #[display("Error: Line {line} {message}")]
    ErrorAt { line: u32, message: String },
    #[display("Error: {message}")]
    Error { message: String },
    #[display("Warning: Line {line} {message}")]
    WarningAt { line: u32, message: String },
    #[display("Warning: {message}")]
    Warning { message: String },
}

impl Diagnostic {
    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Diagnostic::ErrorAt {
            line,
            message: message.into(),
        }
    }

    pub fn error_no_line(message: impl Into<String>) -> Self {
        Diagnostic::Error {
            message: message.into(),
        }
    }

    pub fn warning(line: u32, message: impl Into<String>) -> Self {
        Diagnostic::WarningAt {
            line,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::ErrorAt { .. } | Diagnostic::Error { .. })
    }
}

/// Accumulates diagnostics in insertion order across the whole translation
/// unit. Lowering never short-circuits on an `Error`: it records the
/// diagnostic and keeps going so later constructs can still surface theirs.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&self, line: u32, message: impl Into<String>) {
        let message = message.into();
        trace!("diagnostic: error at line {line}: {message}");
        self.diagnostics
            .borrow_mut()
            .push(Diagnostic::error(line, message));
    }

    pub fn push_error_no_line(&self, message: impl Into<String>) {
        let message = message.into();
        trace!("diagnostic: error: {message}");
        self.diagnostics
            .borrow_mut()
            .push(Diagnostic::error_no_line(message));
    }

    pub fn push_warning(&self, line: u32, message: impl Into<String>) {
        let message = message.into();
        trace!("diagnostic: warning at line {line}: {message}");
        self.diagnostics
            .borrow_mut()
            .push(Diagnostic::warning(line, message));
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.borrow().iter().any(Diagnostic::is_error)
    }

    /// Write every diagnostic to stderr in insertion order.
    pub fn report(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        for d in self.diagnostics.borrow().iter() {
            writeln!(out, "{d}")?;
        }
        Ok(())
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_error_with_line() {
        let d = Diagnostic::error(12, "Symbol not found: y");
        assert_eq!(d.to_string(), "Error: Line 12 Symbol not found: y");
    }

    #[test]
    fn formats_warning_without_line() {
        let d = Diagnostic::Warning {
            message: "orphaned".into(),
        };
        assert_eq!(d.to_string(), "Warning: orphaned");
    }

    #[test]
    fn sink_tracks_error_state() {
        let sink = DiagnosticSink::new();
        assert!(!sink.has_error());
        sink.push_warning(3, "Variable x not used (declared in line 3)");
        assert!(!sink.has_error());
        sink.push_error(5, "Symbol not found: y");
        assert!(sink.has_error());
        assert_eq!(sink.diagnostics().len(), 2);
    }
}
