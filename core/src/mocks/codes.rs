//! Scripted transaction code generator.

use crate::code::format_code;
use crate::providers::CodeGenerator;
use crate::types::TransactionCode;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Hands out scripted codes first, then sequential ones.
///
/// Scripting the same code twice is how tests force a collision.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCodeGenerator {
    script: Arc<Mutex<VecDeque<String>>>,
    sequence: Arc<AtomicU32>,
}

impl ScriptedCodeGenerator {
    /// Generator that yields `codes` in order before falling back to a sequence.
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Arc::new(Mutex::new(codes.into_iter().map(Into::into).collect())),
            sequence: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Codes handed out so far from the fallback sequence.
    #[must_use]
    pub fn sequential_issued(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn generate(&self, now: DateTime<Utc>) -> TransactionCode {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();

        match scripted {
            Some(code) => TransactionCode::new(code),
            None => {
                let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                format_code(now, n % 1_000_000)
            }
        }
    }
}
