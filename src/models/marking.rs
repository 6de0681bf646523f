use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest DSCP code point a QoS policy accepts.
pub const MAX_DSCP: u8 = 63;

/// Marking applied to newly added games when no `DEFAULT` has been saved.
/// 46 is Expedited Forwarding.
pub const FALLBACK_DEFAULT_DSCP: DscpValue = DscpValue(46);

/// Input rejected at the boundary, before any mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DSCP value must be between 0 and 63, got {0}")]
    OutOfRange(i64),

    #[error("DSCP value must be a number between 0 and 63: {0:?}")]
    NotANumber(String),

    #[error("Game name must not be empty")]
    EmptyName,

    #[error("Game name {0:?} contains a reserved character ('=' or a line break)")]
    ReservedCharacter(String),

    #[error("Game name {0:?} must not start or end with whitespace")]
    PaddedName(String),

    #[error("{0:?} is not an executable (.exe) path")]
    NotAnExecutable(String),
}

/// A DSCP marking value, guaranteed to lie in `0..=63`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DscpValue(u8);

impl DscpValue {
    /// Validate an arbitrary integer as a marking value.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (0..=i64::from(MAX_DSCP)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::OutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DscpValue {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for DscpValue {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for DscpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Check that a game name can be used as a policy name and a registry key.
pub fn validate_game_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.contains(['=', '\r', '\n']) {
        return Err(ValidationError::ReservedCharacter(name.to_string()));
    }
    if name.trim() != name {
        return Err(ValidationError::PaddedName(name.to_string()));
    }
    Ok(())
}
