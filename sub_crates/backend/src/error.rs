use std::io;

use thiserror::Error;

/// Errors produced by the text buffer, the undo history and the editor.
///
/// `Position` and `Index` are recoverable and leave the buffer untouched.
/// `Invariant` means the tree is in a state that should be impossible, and
/// `OutOfSync` means the history was replayed against text it never recorded.
/// Both are bugs and must not be swallowed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid position (line {line}, col {col})")]
    Position { line: usize, col: usize },

    #[error("index {index} out of bounds (length {len})")]
    Index { index: usize, len: usize },

    #[error("cannot delete from an empty buffer")]
    EmptyBuffer,

    #[error("nothing to delete at start of document")]
    StartOfDocument,

    #[error("internal invariant violated: {0}")]
    Invariant(&'static str),

    #[error("undo history does not match the text at (line {line}, col {col}) for {ch:?}")]
    OutOfSync { line: usize, col: usize, ch: char },

    #[error("write failed after {written} bytes: {source}")]
    Write {
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for errors that indicate a defect rather than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::Invariant(_) | Error::OutOfSync { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Builds an invariant-violation error, tripping an assertion in debug
/// builds so the defect fails fast under test.
pub(crate) fn invariant(what: &'static str) -> Error {
    debug_assert!(false, "internal invariant violated: {}", what);
    Error::Invariant(what)
}

//===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations() {
        assert!(Error::Invariant("stale weight").is_invariant_violation());
        assert!(Error::OutOfSync {
            line: 1,
            col: 2,
            ch: 'x'
        }
        .is_invariant_violation());
        assert!(!Error::EmptyBuffer.is_invariant_violation());
        assert!(!Error::Position { line: 9, col: 0 }.is_invariant_violation());
    }
}
