//! Debate state definitions.
//!
//! Sliding-window memory: only the current iteration's answer and review are
//! retained in full; completed iterations live on as `previous_summary` text.

use serde::{Deserialize, Serialize};

/// Moderator's complexity assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    // serde requires the catch-all variant to come last.
    #[default]
    #[serde(other)]
    Unset,
}

/// Why a debate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    SimpleQuestion,
    ScoreThreshold,
    ExplicitPass,
    MaxIterations,
    ModeratorDecision,
    Convergence,
}

/// Workflow status. `DirectAnswer` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    InProgress,
    DirectAnswer,
    Completed,
}

/// Structured expert answer. Replaced in full each iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpertAnswer {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub understanding: String,
    #[serde(default)]
    pub core_points: Vec<String>,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub limitations: Vec<String>,
    /// Empty on the first iteration.
    #[serde(default)]
    pub modification_log: Vec<String>,
}

impl ExpertAnswer {
    /// The prose surface a critic quote must be found in to count as
    /// supported criticism.
    pub fn quotable_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.understanding);
        text.push('\n');
        for point in &self.core_points {
            text.push_str(point);
            text.push('\n');
        }
        text.push_str(&self.details);
        text.push('\n');
        text.push_str(&self.conclusion);
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Logic,
    Facts,
    Completeness,
    Relevance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Minor,
    Moderate,
    Major,
}

/// One issue raised by the critic. The `quote` field must cite the expert's
/// actual text; issues without a verifiable quote are unsupported and
/// filtered before they reach the expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticIssue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quote: String,
}

/// Structured critic review. Replaced in full each iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticReview {
    #[serde(default)]
    pub review_version: u32,
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<CriticIssue>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl CriticReview {
    /// Issues whose quote is verifiable against the answer text.
    pub fn supported_issues(&self, answer: &ExpertAnswer) -> Vec<&CriticIssue> {
        let quotable = answer.quotable_text();
        self.issues
            .iter()
            .filter(|issue| !issue.quote.trim().is_empty() && quotable.contains(issue.quote.trim()))
            .collect()
    }
}

/// Mutable state threaded through every phase of one debate turn.
///
/// Single-owner: the engine instance running the turn. All cross-turn
/// memory lives in the conversation store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    /// Immutable anchor; every answer must remain attributable to it.
    pub original_question: String,
    pub complexity: Complexity,

    /// 1-based once work starts; 0 means "not yet started". Only increases.
    pub iteration: u32,
    pub max_iterations: u32,

    pub current_answer: Option<ExpertAnswer>,
    pub current_review: Option<CriticReview>,

    /// Append-only compressed log of completed iterations.
    pub previous_summary: String,

    /// Instruction currently given to the expert.
    pub current_task: String,
    /// Most recent actionable feedback forwarded to the expert.
    pub improvement_guidance: String,

    /// Prior-turn transcript summary; opaque passthrough into prompts.
    pub conversation_context: String,

    pub final_answer: Option<String>,
    pub termination_reason: Option<TerminationReason>,
    pub status: DebateStatus,
}

impl DebateState {
    /// Fresh state for a new debate turn.
    pub fn initial(
        question: impl Into<String>,
        max_iterations: u32,
        previous_summary: impl Into<String>,
        conversation_context: impl Into<String>,
    ) -> Self {
        Self {
            original_question: question.into(),
            complexity: Complexity::Unset,
            iteration: 0,
            max_iterations,
            current_answer: None,
            current_review: None,
            previous_summary: previous_summary.into(),
            current_task: String::new(),
            improvement_guidance: String::new(),
            conversation_context: conversation_context.into(),
            final_answer: None,
            termination_reason: None,
            status: DebateStatus::InProgress,
        }
    }
}
