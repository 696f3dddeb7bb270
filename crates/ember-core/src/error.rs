//! Error types for core value construction.

use std::error::Error;
use std::fmt;

/// Errors from building a [`RecordLayout`](crate::RecordLayout).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The attribute list was empty.
    Empty,
    /// An attribute was declared with zero floats.
    ZeroSizedAttribute {
        /// Position of the offending attribute in layout order.
        index: usize,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "record layout has no attributes"),
            Self::ZeroSizedAttribute { index } => {
                write!(f, "record layout attribute {index} has zero size")
            }
        }
    }
}

impl Error for LayoutError {}
