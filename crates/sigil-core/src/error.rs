//! Error types shared across the cell kernel.

use std::rc::Rc;
use thiserror::Error;

/// Errors produced by cell operations.
///
/// The enum is `Clone` (payloads live behind `Rc`) so a failed computation
/// can be stored inside the cell and handed back to every subsequent reader
/// until a successful recomputation replaces it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    /// A fallible computation returned an error. Stored as the cell's
    /// pending result and re-returned by `try_get` on each read.
    #[error("compute failed in `{cell}`: {message}")]
    Compute { cell: Rc<str>, message: Rc<str> },

    /// A write was attempted on a disposed cell.
    #[error("cell `{0}` is disposed")]
    Disposed(Rc<str>),

    /// A lens write was rejected by its validator.
    #[error("write to `{0}` rejected by validator")]
    Rejected(Rc<str>),

    /// A computation read its own cell before producing a first value.
    #[error("dependency cycle detected at `{0}`")]
    Cycle(Rc<str>),

    /// Async work observed its abort token and returned early.
    #[error("async work was aborted")]
    Aborted,
}

impl CellError {
    /// Build a [`CellError::Compute`] from any displayable error.
    pub fn compute(cell: impl AsRef<str>, err: impl std::fmt::Display) -> Self {
        CellError::Compute {
            cell: Rc::from(cell.as_ref()),
            message: Rc::from(err.to_string().as_str()),
        }
    }

    /// True for errors caused by touching a disposed cell.
    pub fn is_disposed(&self) -> bool {
        matches!(self, CellError::Disposed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_error_formats_cell_and_message() {
        let err = CellError::compute("price", "division by zero");
        assert_eq!(
            err.to_string(),
            "compute failed in `price`: division by zero"
        );
    }

    #[test]
    fn errors_are_cheaply_clonable() {
        let err = CellError::Disposed(Rc::from("total"));
        let copy = err.clone();
        assert_eq!(err, copy);
        assert!(copy.is_disposed());
    }
}
