//! Error types for stat calculation.
//!
//! Everything that can go wrong while mutating or evaluating the
//! calculation graph is represented by the `CalcError` enum.

use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[String]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.join(" -> ")
}

/// Errors that can occur while updating or evaluating a calculator.
///
/// # Examples
///
/// ```rust
/// use statgraph::CalcError;
///
/// let err = CalcError::UnknownModifier("Life +10 (BaseAdd)".to_string());
/// assert!(err.to_string().contains("Life +10"));
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    /// A modifier was removed that was never added (or was already
    /// removed as often as it was added).
    #[error("Modifier was never added: {0}")]
    UnknownModifier(String),

    /// A behavior was removed that was never added.
    #[error("Behavior was never added: {0}")]
    UnknownBehavior(String),

    /// A value range was constructed with its bounds swapped.
    #[error("Invalid value range: minimum {minimum} is greater than maximum {maximum}")]
    InvalidRange { minimum: f64, maximum: f64 },

    /// Evaluation produced a value that is not a finite number.
    #[error("Value of {0} is not representable")]
    Unrepresentable(String),

    /// A value failed while calculating a node.
    #[error("Failed to evaluate {node}: {message}")]
    Evaluation { node: String, message: String },

    /// A node was asked for its value while it was already being computed.
    #[error("Circular evaluation of {0}")]
    CircularEvaluation(String),

    /// The dependency snapshot contains a cycle.
    ///
    /// If A reads B and B reads A, this error contains `[A, B, A]`.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<String> },

    /// Calculator options could not be parsed.
    #[error("Invalid calculator options: {0}")]
    InvalidOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalcError::InvalidRange {
            minimum: 5.0,
            maximum: 1.0,
        };
        let display = err.to_string();
        assert!(display.contains("minimum 5"));
        assert!(display.contains("maximum 1"));
    }

    #[test]
    fn test_cycle_error_display() {
        let err = CalcError::Cycle {
            path: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "Cycle detected: A -> B -> A");
    }

    #[test]
    fn test_empty_cycle_display() {
        let err = CalcError::Cycle { path: Vec::new() };
        assert!(err.to_string().contains("(empty cycle)"));
    }
}
