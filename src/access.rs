//! Allow-list access gate.
//!
//! A session starts [`AccessState::Locked`] and moves to
//! [`AccessState::Unlocked`] once a submitted code matches one of
//! [`ALLOWED_CODES`]. There is no way back other than ending the session.

use serde::Serialize;

/// Pre-shared release codes. Matching is case-insensitive.
pub const ALLOWED_CODES: &[&str] = &["ALPHA1", "BETA01", "TEST99", "DEMO01"];

pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Locked,
    Unlocked,
}

impl AccessState {
    pub fn is_unlocked(self) -> bool {
        matches!(self, AccessState::Unlocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Please enter a validation code")]
    Empty,

    #[error("Invalid format. Code must be 6 alphanumeric characters")]
    InvalidFormat,

    #[error("Invalid access code. Please check your code and try again")]
    NotRecognized,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    codes: Vec<String>,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(ALLOWED_CODES.iter().copied())
    }
}

impl AccessGate {
    pub fn new<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            codes: codes.into_iter().map(|c| c.trim().to_ascii_uppercase()).collect(),
        }
    }

    /// Checks a submitted code without touching any state.
    pub fn check(&self, input: &str) -> Result<(), AccessError> {
        if input.is_empty() {
            return Err(AccessError::Empty);
        }
        if !is_valid_format(input) {
            return Err(AccessError::InvalidFormat);
        }

        let candidate = input.trim().to_ascii_uppercase();
        if self.codes.iter().any(|code| *code == candidate) {
            Ok(())
        } else {
            Err(AccessError::NotRecognized)
        }
    }

    /// Applies a submission to `state`. On failure the state is left as it was.
    pub fn submit(&self, state: &mut AccessState, input: &str) -> Result<(), AccessError> {
        self.check(input)?;
        *state = AccessState::Unlocked;
        Ok(())
    }
}

fn is_valid_format(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
