//! Observed periodic bit patterns.
//!
//! A pattern is an N×T matrix: one row per agent, one column per time step
//! within a single period. Column `t` is the global state at step `t`, and
//! the period wraps, so column `T-1` is followed by column `0`.

use crate::error::PatternError;
use crate::types::{count_ones, render_bits, AgentId, Bit};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// An immutable N×T bit matrix.
///
/// Serialized as an array of per-agent bitstrings, e.g. `["110", "011"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Pattern {
    rows: Vec<Vec<Bit>>,
}

impl Pattern {
    /// Builds a pattern, rejecting empty or ragged matrices.
    pub fn new(rows: Vec<Vec<Bit>>) -> Result<Self, PatternError> {
        let period = rows.first().map(Vec::len).unwrap_or(0);
        if period == 0 {
            return Err(PatternError::Empty);
        }
        for (agent, row) in rows.iter().enumerate() {
            if row.len() != period {
                return Err(PatternError::Ragged {
                    agent,
                    expected: period,
                    found: row.len(),
                });
            }
        }
        Ok(Self { rows })
    }

    /// Parses one bitstring per agent.
    pub fn from_strings<S: AsRef<str>>(rows: &[S]) -> Result<Self, PatternError> {
        let mut parsed = Vec::with_capacity(rows.len());
        for (agent, row) in rows.iter().enumerate() {
            let mut bits = Vec::with_capacity(row.as_ref().len());
            for (step, c) in row.as_ref().chars().enumerate() {
                let bit = Bit::from_char(c).ok_or(PatternError::InvalidBit {
                    agent,
                    step,
                    found: c,
                })?;
                bits.push(bit);
            }
            parsed.push(bits);
        }
        Self::new(parsed)
    }

    /// Parses the JSON form: an array of per-agent bitstrings.
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        serde_json::from_str(json).map_err(|e| PatternError::Json(e.to_string()))
    }

    pub fn num_agents(&self) -> usize {
        self.rows.len()
    }

    /// Number of steps in one period (T).
    pub fn period(&self) -> usize {
        self.rows[0].len()
    }

    /// State of `agent` at step `t` (wrapping around the period).
    pub fn bit(&self, agent: AgentId, t: usize) -> Bit {
        let row = &self.rows[agent];
        row[t % row.len()]
    }

    pub fn row(&self, agent: AgentId) -> &[Bit] {
        &self.rows[agent]
    }

    /// Global state at step `t` (wrapping around the period).
    pub fn column(&self, t: usize) -> Vec<Bit> {
        (0..self.num_agents()).map(|a| self.bit(a, t)).collect()
    }

    pub fn initial_state(&self) -> Vec<Bit> {
        self.column(0)
    }

    /// Agents in state `1` at step `t`.
    pub fn ones_at(&self, t: usize) -> usize {
        count_ones(&self.column(t))
    }

    /// Per-agent bitstrings.
    pub fn to_strings(&self) -> Vec<String> {
        self.rows.iter().map(|r| render_bits(r)).collect()
    }
}

impl TryFrom<Vec<String>> for Pattern {
    type Error = PatternError;

    fn try_from(rows: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_strings(&rows)
    }
}

impl From<Pattern> for Vec<String> {
    fn from(pattern: Pattern) -> Self {
        pattern.to_strings()
    }
}

/// Anything that can produce a pattern for inference.
///
/// Sources that permute or otherwise randomize their output draw only from
/// the generator they are handed.
pub trait PatternSource {
    fn generate(&self, rng: &mut dyn RngCore) -> Result<Pattern, PatternError>;
}

impl PatternSource for Pattern {
    fn generate(&self, _rng: &mut dyn RngCore) -> Result<Pattern, PatternError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_from_strings() {
        let pattern = Pattern::from_strings(&["110", "011"]).unwrap();
        assert_eq!(pattern.num_agents(), 2);
        assert_eq!(pattern.period(), 3);
        assert_eq!(pattern.bit(1, 2), Bit::One);
        assert_eq!(pattern.initial_state(), vec![Bit::One, Bit::Zero]);
    }

    #[test]
    fn test_pattern_wraps_period() {
        let pattern = Pattern::from_strings(&["10"]).unwrap();
        assert_eq!(pattern.bit(0, 2), Bit::One);
        assert_eq!(pattern.column(3), vec![Bit::Zero]);
    }

    #[test]
    fn test_pattern_rejects_ragged() {
        let err = Pattern::from_strings(&["110", "01"]).unwrap_err();
        assert_eq!(
            err,
            PatternError::Ragged {
                agent: 1,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_pattern_rejects_empty_and_invalid() {
        let empty: [&str; 0] = [];
        assert_eq!(Pattern::from_strings(&empty).unwrap_err(), PatternError::Empty);
        assert_eq!(Pattern::from_strings(&[""]).unwrap_err(), PatternError::Empty);
        assert!(matches!(
            Pattern::from_strings(&["1x"]).unwrap_err(),
            PatternError::InvalidBit { agent: 0, step: 1, found: 'x' }
        ));
    }

    #[test]
    fn test_pattern_json() {
        let pattern = Pattern::from_json(r#"["1100", "0110"]"#).unwrap();
        assert_eq!(pattern.ones_at(1), 2);

        let json = serde_json::to_string(&pattern).unwrap();
        assert_eq!(json, r#"["1100","0110"]"#);

        assert!(matches!(
            Pattern::from_json(r#"["12"]"#).unwrap_err(),
            PatternError::Json(_)
        ));
    }
}
