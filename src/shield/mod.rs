// Shield module - detection and redaction of sensitive content
// Everything sent upstream passes through here first.

pub mod catalog;
pub mod redaction;
pub mod sanitize;

pub use catalog::{PatternCategory, CUSTOM_KEYWORD_PLACEHOLDER};
pub use redaction::{security_score, RedactionEngine, RedactionOutcome};
pub use sanitize::sanitize_error_message;
