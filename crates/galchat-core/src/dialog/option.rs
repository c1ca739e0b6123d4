//! Dialogue option types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Neutral placeholder emoji used when the model supplies none.
pub const DEFAULT_OPTION_EMOJI: &str = "💬";

/// Lower bound of a favor delta.
pub const FAVOR_MIN: i32 = -5;
/// Upper bound of a favor delta.
pub const FAVOR_MAX: i32 = 5;

/// Single-letter label identifying one of the five dialogue options.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
    E,
}

impl OptionLabel {
    /// Maps an uppercase ASCII letter to a label.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            _ => None,
        }
    }
}

/// One candidate reply surfaced to the user.
///
/// Produced only by the response parser; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogOption {
    pub id: OptionLabel,
    /// The reply text itself
    pub text: String,
    /// Style tag (role label with brackets stripped), empty when absent
    #[serde(default)]
    pub style: String,
    /// Kaomoji accompanying the reply, empty when absent
    #[serde(default)]
    pub kaomoji: String,
    /// Signed relationship impact, clamped to [-5, +5]
    #[serde(default)]
    pub favor_change: i32,
    /// Free-text impact note
    #[serde(default)]
    pub effect: String,
    /// Graphical emoji shown by the UI
    #[serde(default)]
    pub emoji: String,
}

impl DialogOption {
    /// Creates an option with default metadata (empty style, zero favor,
    /// neutral emoji) so downstream code never sees missing fields.
    pub fn new(id: OptionLabel, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            style: String::new(),
            kaomoji: String::new(),
            favor_change: 0,
            effect: String::new(),
            emoji: DEFAULT_OPTION_EMOJI.to_string(),
        }
    }
}

/// Clamps a parsed favor delta into the supported range.
pub fn clamp_favor(value: i32) -> i32 {
    value.clamp(FAVOR_MIN, FAVOR_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_label_from_char() {
        assert_eq!(OptionLabel::from_char('A'), Some(OptionLabel::A));
        assert_eq!(OptionLabel::from_char('E'), Some(OptionLabel::E));
        assert_eq!(OptionLabel::from_char('F'), None);
        assert_eq!(OptionLabel::from_char('a'), None);
    }

    #[test]
    fn test_label_string_round_trip() {
        assert_eq!(OptionLabel::B.to_string(), "B");
        assert_eq!(OptionLabel::from_str("B").unwrap(), OptionLabel::B);
    }

    #[test]
    fn test_new_option_defaults() {
        let option = DialogOption::new(OptionLabel::C, "求我呀~");
        assert_eq!(option.style, "");
        assert_eq!(option.favor_change, 0);
        assert_eq!(option.emoji, DEFAULT_OPTION_EMOJI);
    }

    #[test]
    fn test_clamp_favor() {
        assert_eq!(clamp_favor(99), 5);
        assert_eq!(clamp_favor(-99), -5);
        assert_eq!(clamp_favor(3), 3);
    }
}
