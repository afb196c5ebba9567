//! Transaction code generation.
//!
//! Codes look like `TRX-20250101-048213`: the UTC creation date followed by a
//! six digit random suffix. The suffix space is small (10^6 per day), so
//! collisions are expected under load and handled by the controller's retry.

use crate::providers::CodeGenerator;
use crate::types::TransactionCode;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Prefix of every transaction code
pub const CODE_PREFIX: &str = "TRX";

/// Digits in the random suffix
pub const SUFFIX_DIGITS: usize = 6;

/// Format a code from its date and numeric suffix.
#[must_use]
pub fn format_code(now: DateTime<Utc>, suffix: u32) -> TransactionCode {
    TransactionCode::new(format!(
        "{CODE_PREFIX}-{}-{suffix:0width$}",
        now.format("%Y%m%d"),
        width = SUFFIX_DIGITS
    ))
}

/// Date stamp plus thread-local random suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, now: DateTime<Utc>) -> TransactionCode {
        let suffix = rand::thread_rng().gen_range(0..1_000_000);
        format_code(now, suffix)
    }
}
