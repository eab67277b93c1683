//! Events emitted while a debate turn runs.
//!
//! Serialized with a `type` tag so transports (SSE, tests) can forward them
//! verbatim as JSON.

use serde::{Deserialize, Serialize};

use super::state::{CriticReview, DebateStatus, ExpertAnswer, TerminationReason};

/// The four phases of the debate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    ModeratorInit,
    ExpertGenerate,
    CriticReview,
    ModeratorSynthesize,
}

/// Ordered event stream for one debate turn.
///
/// Ordering contract: `PhaseStart` precedes that phase's payload event;
/// exactly one terminal event (`Done` or `Error`) closes the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    PhaseStart {
        phase: DebatePhase,
        iteration: u32,
    },
    ExpertAnswer {
        iteration: u32,
        answer: ExpertAnswer,
    },
    CriticReview {
        iteration: u32,
        review: CriticReview,
    },
    IterationComplete {
        iteration: u32,
        status: DebateStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        summary: String,
    },
    Done {
        final_answer: String,
        was_direct_answer: bool,
        termination_reason: TerminationReason,
        total_iterations: u32,
    },
    Error {
        error: String,
    },
}

impl DebateEvent {
    /// Terminal events close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DebateEvent::Done { .. } | DebateEvent::Error { .. })
    }
}
