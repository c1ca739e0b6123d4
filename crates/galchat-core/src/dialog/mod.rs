//! Dialogue domain: option types, the response parser, and situation
//! analysis for the two-phase flow.

pub mod analysis;
pub mod option;
pub mod parser;

pub use analysis::SituationAnalysis;
pub use option::{DialogOption, OptionLabel};
pub use parser::{EXPECTED_OPTION_COUNT, ParsedResponse, fallback_response, parse_response};
