//! Tally summaries
//!
//! A tally status line carries one digit per input: `0` off, `1` program
//! (on air), `2` preview. Input numbers are 1-based.

use serde::Serialize;
use thiserror::Error;

/// State of a single input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TallyState {
    Off,
    Program,
    Preview,
}

impl TallyState {
    fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '0' => Some(Self::Off),
            '1' => Some(Self::Program),
            '2' => Some(Self::Preview),
            _ => None,
        }
    }
}

/// Structured per-input summary of a tally line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallySummary {
    /// State of every input, index 0 is input 1
    pub inputs: Vec<TallyState>,
    /// Inputs currently on air
    pub program: Vec<usize>,
    /// Inputs currently in preview
    pub preview: Vec<usize>,
}

impl TallySummary {
    /// State of a 1-based input number
    pub fn state_of(&self, input: usize) -> Option<TallyState> {
        input
            .checked_sub(1)
            .and_then(|index| self.inputs.get(index).copied())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("Tally string is empty")]
    Empty,
    #[error("Invalid tally character '{found}' for input {input}")]
    InvalidCharacter { input: usize, found: char },
}

/// Convert a tally status string (prefix already stripped) into a summary
pub fn summarize(tally: &str) -> Result<TallySummary, TallyError> {
    let tally = tally.trim();
    if tally.is_empty() {
        return Err(TallyError::Empty);
    }

    let mut summary = TallySummary {
        inputs: Vec::with_capacity(tally.len()),
        program: Vec::new(),
        preview: Vec::new(),
    };

    for (index, digit) in tally.chars().enumerate() {
        let input = index + 1;
        let state = TallyState::from_digit(digit)
            .ok_or(TallyError::InvalidCharacter { input, found: digit })?;

        match state {
            TallyState::Program => summary.program.push(input),
            TallyState::Preview => summary.preview.push(input),
            TallyState::Off => {}
        }
        summary.inputs.push(state);
    }

    Ok(summary)
}
