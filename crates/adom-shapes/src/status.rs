//! Shape status and redundancy bitmasks.
//!
//! The status is a dense tagged variant rather than a bitset, so that the
//! empty assertion excludes the closure flags by construction:
//!
//! - `ZeroDimUniv`: the shape is the zero-dimensional vector space ℝ⁰;
//! - `Empty`: the shape is the empty set;
//! - `Matrix { closed, reduced }`: the matrix is meaningful, possibly
//!   known to be (strongly / shortest-path) closed and/or reduced.

use adom_core::{DomainError, DomainResult};

/// A conjunctive assertion about a shape's internal representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The zero-dimensional universe (no other flag applies).
    ZeroDimUniv,
    /// The empty set (no closure flag applies).
    Empty,
    /// A live matrix with its cached closure/reduction information.
    Matrix { closed: bool, reduced: bool },
}

impl Status {
    /// Status of a freshly built universe of the given dimension.
    pub fn universe(space_dim: usize) -> Self {
        if space_dim == 0 {
            Status::ZeroDimUniv
        } else {
            // A universe matrix is trivially closed.
            Status::Matrix { closed: true, reduced: false }
        }
    }

    pub fn is_zero_dim_univ(self) -> bool {
        self == Status::ZeroDimUniv
    }

    pub fn is_empty(self) -> bool {
        self == Status::Empty
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Status::Matrix { closed: true, .. })
    }

    pub fn is_reduced(self) -> bool {
        matches!(self, Status::Matrix { reduced: true, .. })
    }

    pub fn set_empty(&mut self) {
        *self = Status::Empty;
    }

    pub fn set_zero_dim_univ(&mut self) {
        *self = Status::ZeroDimUniv;
    }

    pub fn set_closed(&mut self) {
        *self = Status::Matrix {
            closed: true,
            reduced: self.is_reduced(),
        };
    }

    pub fn reset_closed(&mut self) {
        if let Status::Matrix { reduced, .. } = *self {
            *self = Status::Matrix { closed: false, reduced };
        }
    }

    pub fn set_reduced(&mut self) {
        if let Status::Matrix { closed, .. } = *self {
            *self = Status::Matrix { closed, reduced: true };
        }
    }

    pub fn reset_reduced(&mut self) {
        if let Status::Matrix { closed, .. } = *self {
            *self = Status::Matrix { closed, reduced: false };
        }
    }

    /// Mark the matrix live and drop every cached flag.
    pub fn set_raw_matrix(&mut self) {
        *self = Status::Matrix { closed: false, reduced: false };
    }

    /// The stable ASCII token line.
    pub fn ascii_token(self) -> String {
        match self {
            Status::ZeroDimUniv => "ZE".to_string(),
            Status::Empty => "EM".to_string(),
            Status::Matrix { closed, reduced } => {
                let mut s = String::from(if closed { "SC" } else { "NC" });
                if reduced {
                    s.push_str(" SR");
                }
                s
            }
        }
    }

    /// Parse the token line produced by [`Status::ascii_token`].
    pub fn from_ascii_token(line: &str) -> DomainResult<Self> {
        let mut words = line.split_whitespace();
        let status = match words.next() {
            Some("ZE") => Status::ZeroDimUniv,
            Some("EM") => Status::Empty,
            Some("SC") => Status::Matrix { closed: true, reduced: false },
            Some("NC") => Status::Matrix { closed: false, reduced: false },
            other => {
                return Err(DomainError::Parse(format!(
                    "invalid status token {:?}",
                    other.unwrap_or("")
                )))
            }
        };
        match (words.next(), status) {
            (None, s) => Ok(s),
            (Some("SR"), Status::Matrix { closed, .. }) => {
                Ok(Status::Matrix { closed, reduced: true })
            }
            (Some(tok), _) => Err(DomainError::Parse(format!(
                "unexpected status token {:?}",
                tok
            ))),
        }
    }
}

/// A bitmask row used to record non-redundant matrix entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitRow {
    words: Vec<u64>,
}

impl BitRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, i: usize) {
        let word = i / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (i % 64);
    }

    pub fn get(&self, i: usize) -> bool {
        self.words
            .get(i / 64)
            .is_some_and(|w| w & (1 << (i % 64)) != 0)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_excludes_closure() {
        let mut s = Status::Matrix { closed: true, reduced: true };
        s.set_empty();
        assert!(s.is_empty());
        assert!(!s.is_closed());
        assert!(!s.is_reduced());
        // Closure flags on an empty status are unreachable by construction.
        s.reset_closed();
        assert!(s.is_empty());
    }

    #[test]
    fn test_ascii_tokens_round_trip() {
        for s in [
            Status::ZeroDimUniv,
            Status::Empty,
            Status::Matrix { closed: false, reduced: false },
            Status::Matrix { closed: true, reduced: false },
            Status::Matrix { closed: true, reduced: true },
            Status::Matrix { closed: false, reduced: true },
        ] {
            let token = s.ascii_token();
            assert_eq!(Status::from_ascii_token(&token).unwrap(), s);
        }
        assert!(Status::from_ascii_token("XX").is_err());
    }

    #[test]
    fn test_bit_row() {
        let mut r = BitRow::new();
        assert!(!r.get(70));
        r.set(3);
        r.set(70);
        assert!(r.get(3) && r.get(70));
        assert!(!r.get(4));
        assert_eq!(r.count_ones(), 2);
    }
}
