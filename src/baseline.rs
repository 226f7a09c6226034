//! Reference numbers for a copying task model that learns nothing.
//!
//! The trivial predictor emits the wait symbol for the first `len_wait + len_sequence` steps and
//! then guesses uniformly among the `num_symbols` payload symbols. Under cross-entropy, averaged
//! over the whole sequence, it scores `len_sequence * ln(num_symbols) / total_length`.

use crate::error::{CopyTaskError, Result};

fn check_domain(len_sequence: usize, num_symbols: usize, len_wait: usize) -> Result<f64> {
    if num_symbols == 0 {
        return Err(CopyTaskError::DomainError(
            "num_symbols must be positive (log of zero)".to_string(),
        ));
    }
    let total = len_wait as f64 + 2.0 * len_sequence as f64;
    if total == 0.0 {
        return Err(CopyTaskError::DomainError(
            "len_wait + 2 * len_sequence is zero".to_string(),
        ));
    }
    Ok(total)
}

/// Expected per-step cross-entropy of the trivial predictor.
pub fn baseline_loss(len_sequence: usize, num_symbols: usize, len_wait: usize) -> Result<f64> {
    let total = check_domain(len_sequence, num_symbols, len_wait)?;
    Ok(len_sequence as f64 * (num_symbols as f64).ln() / total)
}

/// Expected per-step accuracy of the trivial predictor.
pub fn memoryless_accuracy(
    len_sequence: usize,
    num_symbols: usize,
    len_wait: usize,
) -> Result<f64> {
    let total = check_domain(len_sequence, num_symbols, len_wait)?;
    let certain = (len_wait + len_sequence) as f64;
    let guessed = len_sequence as f64 / num_symbols as f64;
    Ok((certain + guessed) / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        let v = baseline_loss(10, 8, 100).unwrap();
        assert!((v - 0.1732867951399863).abs() < 1e-9, "{}", v);
    }

    quickcheck! {
        fn decreases_with_waiting(len_sequence: u8, num_symbols: u8, len_wait: u16) -> bool {
            let ls = len_sequence as usize + 1;
            let ns = num_symbols as usize + 2;
            let lw = len_wait as usize;
            let a = baseline_loss(ls, ns, lw).unwrap();
            let b = baseline_loss(ls, ns, lw + 1).unwrap();
            b < a
        }
    }

    #[test]
    fn single_symbol_costs_nothing() {
        assert_eq!(baseline_loss(5, 1, 20).unwrap(), 0.0);
        assert_eq!(memoryless_accuracy(5, 1, 20).unwrap(), 1.0);
    }

    #[test]
    fn no_payload_costs_nothing() {
        assert_eq!(baseline_loss(0, 8, 20).unwrap(), 0.0);
    }

    #[test]
    fn accuracy_of_guessing() {
        // 25 certain steps plus 5 guesses at 1/5 each
        let v = memoryless_accuracy(5, 5, 20).unwrap();
        assert!((v - 26.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn domain_errors() {
        assert!(matches!(
            baseline_loss(10, 0, 100),
            Err(CopyTaskError::DomainError(_))
        ));
        assert!(matches!(
            baseline_loss(0, 8, 0),
            Err(CopyTaskError::DomainError(_))
        ));
        assert!(memoryless_accuracy(0, 3, 0).is_err());
    }
}
