// Error taxonomy and diagnostic accumulation.
//
// Grounded on `aex::message::Messages`: a running accumulator with an
// error count and typed constructors, generalized here to the six error
// categories of spec §7 (Syntax, Semantic, Resource, Range, Convergence,
// User-triggered) via `thiserror` instead of the teacher's hand-rolled
// `Display` impl.

use std::fmt;

use thiserror::Error;

use crate::pos::Pos;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Error, Clone, Debug)]
pub enum AsmError {
    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("semantic error: {message}")]
    Semantic { message: String },

    #[error("resource error: {message}")]
    Resource { message: String },

    #[error("range error: {message}")]
    Range { message: String },

    #[error("convergence error: {message}")]
    Convergence { message: String },

    #[error("{message}")]
    UserTriggered { message: String },
}

impl AsmError {
    pub fn syntax(message: impl Into<String>) -> Self {
        AsmError::Syntax { message: message.into() }
    }
    pub fn semantic(message: impl Into<String>) -> Self {
        AsmError::Semantic { message: message.into() }
    }
    pub fn resource(message: impl Into<String>) -> Self {
        AsmError::Resource { message: message.into() }
    }
    pub fn range(message: impl Into<String>) -> Self {
        AsmError::Range { message: message.into() }
    }
    pub fn convergence(message: impl Into<String>) -> Self {
        AsmError::Convergence { message: message.into() }
    }
    pub fn user(message: impl Into<String>) -> Self {
        AsmError::UserTriggered { message: message.into() }
    }

    /// Resource and Convergence errors abort assembly immediately;
    /// everything else merely increments the error counter (spec §7).
    pub fn is_immediately_fatal(&self) -> bool {
        matches!(self, AsmError::Resource { .. } | AsmError::Convergence { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub pos:   Pos,
    pub caret: u16,
    pub error: AsmError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.error)?;
        writeln!(f)?;
        write!(f, "{}^", " ".repeat(self.caret as usize))
    }
}

/// Accumulates diagnostics across a pass and aborts once `err_max`
/// non-fatal errors have been recorded (spec §5, §7).
pub struct Diagnostics {
    entries:  Vec<Diagnostic>,
    err_max:  usize,
    n_errors: usize,
}

impl Diagnostics {
    pub fn new(err_max: usize) -> Self {
        Diagnostics { entries: Vec::new(), err_max, n_errors: 0 }
    }

    /// Records a diagnostic. Returns `Err` if assembly must abort now,
    /// either because the error is immediately fatal or because the
    /// error count has reached `err_max`.
    pub fn report(&mut self, pos: Pos, caret: u16, error: AsmError) -> Result<(), AsmError> {
        let immediately_fatal = error.is_immediately_fatal();
        self.n_errors += 1;
        self.entries.push(Diagnostic { pos, caret, error: error.clone() });
        if immediately_fatal {
            return Err(error);
        }
        if self.n_errors >= self.err_max {
            return Err(AsmError::resource(format!(
                "too many errors ({} >= {})", self.n_errors, self.err_max
            )));
        }
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        self.n_errors > 0
    }

    pub fn count(&self) -> usize {
        self.n_errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos { Pos::start("f.asm".into()) }

    #[test]
    fn accumulates_and_counts() {
        let mut d = Diagnostics::new(3);
        d.report(pos(), 0, AsmError::syntax("bad token")).unwrap();
        d.report(pos(), 0, AsmError::semantic("undefined symbol")).unwrap();
        assert_eq!(d.count(), 2);
        assert!(d.has_errors());
    }

    #[test]
    fn aborts_after_err_max() {
        let mut d = Diagnostics::new(2);
        d.report(pos(), 0, AsmError::syntax("a")).unwrap();
        let r = d.report(pos(), 0, AsmError::syntax("b"));
        assert!(r.is_err());
    }

    #[test]
    fn resource_error_is_immediately_fatal() {
        let mut d = Diagnostics::new(10);
        let r = d.report(pos(), 0, AsmError::resource("cannot open file"));
        assert!(r.is_err());
    }
}
