use crate::models::internal::{ConcernFlag, ConcernType, ProactivePrompt, Severity};

/// Picks at most one proactive prompt from pattern-analysis output.
///
/// Pure and recomputed on every session start, so it always reflects the
/// latest analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsightEngine;

impl InsightEngine {
    pub fn new() -> Self {
        Self
    }

    /// First `High` flag in input order wins; `Low` and `Medium` are ignored.
    pub fn select_prompt(&self, flags: &[ConcernFlag]) -> Option<ProactivePrompt> {
        flags
            .iter()
            .find(|flag| flag.severity == Severity::High)
            .map(|flag| ProactivePrompt {
                concern: flag.concern,
                message: prompt_template(flag.concern).to_string(),
            })
    }
}

pub fn prompt_template(concern: ConcernType) -> &'static str {
    match concern {
        ConcernType::ConsecutiveStress => {
            "I've noticed your last few check-ins have been pretty stressful. \
             Want to talk through what's been weighing on you?"
        }
        ConcernType::LowConnection => {
            "Your check-ins suggest you've been feeling a bit disconnected lately. \
             Would it help to explore some small ways to feel closer?"
        }
        ConcernType::ConnectionDrop => {
            "It looks like your sense of connection has dipped recently. \
             Has something changed that you'd like to work through together?"
        }
        ConcernType::LowEngagement => {
            "It's been a little quiet on the check-in front. \
             How are things going between you two?"
        }
        ConcernType::Unrecognized => {
            "I noticed a pattern in your recent check-ins that might be worth a conversation. \
             Want to talk about how things are going?"
        }
    }
}
