//! The debate engine — the single canonical debate loop.
//!
//! `DebateEngine` runs the complete moderator/expert/critic cycle for one
//! user question. Transports are thin presentation layers that:
//! - create an engine from their own state
//! - call `run()` to get an event stream and input channel
//! - map `DebateEvent` to their wire format
//! - send `EngineInput::Cancel` to stop between phases
//!
//! The four-phase cycle is coded as an explicit loop; routing decisions are
//! plain `match` arms, not a graph runtime.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ai::{CallerError, ModelCaller};
use crate::config::DebateConfig;
use crate::storage::{ConversationStore, MessageRole, MessageType};

use super::compress::{self, DEFAULT_EXCHANGE_LIMIT};
use super::events::{DebateEvent, DebatePhase};
use super::parse::{self, str_field};
use super::prompts;
use super::state::{
    Complexity, CriticReview, DebateState, DebateStatus, ExpertAnswer, TerminationReason,
};

/// Maximum conversation title length, in characters.
const TITLE_CHAR_LIMIT: usize = 50;

/// One model caller per debate role. Roles may share a caller.
#[derive(Clone)]
pub struct RoleCallers {
    pub moderator: Arc<dyn ModelCaller>,
    pub expert: Arc<dyn ModelCaller>,
    pub critic: Arc<dyn ModelCaller>,
}

/// Inputs the consumer can send while a turn runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineInput {
    /// Stop at the next phase boundary. Nothing further is emitted or
    /// persisted for this turn.
    Cancel,
}

pub struct DebateEngine {
    callers: RoleCallers,
    store: Arc<dyn ConversationStore>,
    config: DebateConfig,
}

impl DebateEngine {
    pub fn new(
        callers: RoleCallers,
        store: Arc<dyn ConversationStore>,
        config: DebateConfig,
    ) -> Self {
        Self {
            callers,
            store,
            config,
        }
    }

    /// Start one debate turn.
    ///
    /// Returns `(event_receiver, input_sender)`. The turn runs as a spawned
    /// tokio task and closes the event channel after the terminal event.
    pub fn run(
        self,
        question: String,
        conversation_id: Option<String>,
    ) -> (
        mpsc::UnboundedReceiver<DebateEvent>,
        mpsc::UnboundedSender<EngineInput>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            self.run_inner(question, conversation_id, event_tx, input_rx)
                .await;
        });

        (event_rx, input_tx)
    }

    async fn run_inner(
        self,
        question: String,
        conversation_id: Option<String>,
        event_tx: mpsc::UnboundedSender<DebateEvent>,
        mut input_rx: mpsc::UnboundedReceiver<EngineInput>,
    ) {
        let emit = |event: DebateEvent| {
            let _ = event_tx.send(event);
        };

        if let Some(id) = &conversation_id {
            self.record_user_query(id, &question).await;
        }

        let (previous_summary, conversation_context) = match &conversation_id {
            Some(id) => self.load_turn_context(id).await,
            None => (String::new(), String::new()),
        };

        let mut state = DebateState::initial(
            &question,
            self.config.max_iterations,
            previous_summary,
            conversation_context,
        );

        emit(DebateEvent::PhaseStart {
            phase: DebatePhase::ModeratorInit,
            iteration: 0,
        });
        if let Err(e) = self.moderator_init(&mut state, conversation_id.as_deref()).await {
            emit(DebateEvent::Error {
                error: e.to_string(),
            });
            return;
        }

        if state.status == DebateStatus::DirectAnswer {
            let final_answer = state.final_answer.clone().unwrap_or_default();
            emit(DebateEvent::Done {
                final_answer: final_answer.clone(),
                was_direct_answer: true,
                termination_reason: TerminationReason::SimpleQuestion,
                total_iterations: 0,
            });
            if let Some(id) = &conversation_id {
                self.record_final_answer(id, &final_answer, &state).await;
            }
            return;
        }

        while state.status != DebateStatus::Completed {
            if cancelled(&mut input_rx) {
                debug!(iteration = state.iteration, "debate turn cancelled");
                return;
            }
            let iteration = state.iteration;

            emit(DebateEvent::PhaseStart {
                phase: DebatePhase::ExpertGenerate,
                iteration,
            });
            let answer = match self.expert_generate(&mut state).await {
                Ok(answer) => answer,
                Err(e) => {
                    emit(DebateEvent::Error {
                        error: e.to_string(),
                    });
                    return;
                }
            };
            emit(DebateEvent::ExpertAnswer { iteration, answer });
            if let Some(id) = &conversation_id {
                self.record_transcript(
                    id,
                    MessageType::ExpertAnswer,
                    state.current_answer.as_ref(),
                    iteration,
                )
                .await;
            }

            if cancelled(&mut input_rx) {
                debug!(iteration, "debate turn cancelled");
                return;
            }

            emit(DebateEvent::PhaseStart {
                phase: DebatePhase::CriticReview,
                iteration,
            });
            let review = match self.critic_review(&mut state).await {
                Ok(review) => review,
                Err(e) => {
                    emit(DebateEvent::Error {
                        error: e.to_string(),
                    });
                    return;
                }
            };
            emit(DebateEvent::CriticReview { iteration, review });
            if let Some(id) = &conversation_id {
                self.record_transcript(
                    id,
                    MessageType::CriticReview,
                    state.current_review.as_ref(),
                    iteration,
                )
                .await;
            }

            if cancelled(&mut input_rx) {
                debug!(iteration, "debate turn cancelled");
                return;
            }

            emit(DebateEvent::PhaseStart {
                phase: DebatePhase::ModeratorSynthesize,
                iteration,
            });
            if let Err(e) = self
                .moderator_synthesize(&mut state, conversation_id.as_deref())
                .await
            {
                emit(DebateEvent::Error {
                    error: e.to_string(),
                });
                return;
            }

            emit(DebateEvent::IterationComplete {
                iteration,
                status: state.status,
                score: state.current_review.as_ref().map(|r| r.overall_score),
                summary: state.previous_summary.clone(),
            });
        }

        let final_answer = state.final_answer.clone().unwrap_or_default();
        let termination_reason = state
            .termination_reason
            .unwrap_or(TerminationReason::ModeratorDecision);
        emit(DebateEvent::Done {
            final_answer: final_answer.clone(),
            was_direct_answer: false,
            termination_reason,
            total_iterations: state.iteration,
        });
        if let Some(id) = &conversation_id {
            self.record_final_answer(id, &final_answer, &state).await;
        }
    }

    /// Phase 1: the moderator triages the question.
    ///
    /// Parse failures are recovered by treating the question as complex and
    /// delegating with a generic task. Only transport failures propagate.
    async fn moderator_init(
        &self,
        state: &mut DebateState,
        conversation_id: Option<&str>,
    ) -> Result<(), CallerError> {
        let prompt = prompts::moderator_init(&state.original_question, &state.conversation_context);
        let response = self.callers.moderator.invoke(&prompt).await?;

        let map = match parse::extract_json(&response) {
            Ok(map) => map,
            Err(failure) => {
                warn!(error = %failure.error, "moderator init response unparseable, delegating as complex");
                state.complexity = Complexity::Complex;
                state.current_task = generic_task(&state.original_question);
                state.iteration = 1;
                return Ok(());
            }
        };

        state.complexity = map
            .get("complexity")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(Complexity::Complex);

        let decision = str_field(&map, "decision").unwrap_or("delegate_expert");
        let direct_answer = str_field(&map, "direct_answer");

        if let Some(id) = conversation_id {
            self.record_analysis(id, MessageType::ModeratorInit, &init_analysis(&map), None)
                .await;
        }

        match (decision, direct_answer) {
            ("direct_answer", Some(answer)) => {
                state.final_answer = Some(answer.to_string());
                state.status = DebateStatus::DirectAnswer;
                state.termination_reason = Some(TerminationReason::SimpleQuestion);
            }
            _ => {
                state.current_task = str_field(&map, "task_for_expert")
                    .map(str::to_string)
                    .unwrap_or_else(|| generic_task(&state.original_question));
                state.iteration = 1;
            }
        }
        debug!(complexity = ?state.complexity, decision, "moderator init complete");
        Ok(())
    }

    /// Phase 2: the expert drafts or refines the answer.
    ///
    /// Unparseable output degrades to a minimal answer that carries the raw
    /// text, so the critic still has something real to review.
    async fn expert_generate(&self, state: &mut DebateState) -> Result<ExpertAnswer, CallerError> {
        let supported = match (&state.current_review, &state.current_answer) {
            (Some(review), Some(answer)) => review.supported_issues(answer),
            _ => Vec::new(),
        };
        let prompt = prompts::expert_generate(state, &supported);
        let response = self.callers.expert.invoke(&prompt).await?;

        let answer = match parse::extract_json(&response)
            .map_err(|f| f.error)
            .and_then(|map| {
                serde_json::from_value::<ExpertAnswer>(Value::Object(map)).map_err(|e| e.to_string())
            }) {
            Ok(mut answer) => {
                if answer.version == 0 {
                    answer.version = state.iteration;
                }
                answer
            }
            Err(error) => {
                warn!(%error, "expert response unparseable, wrapping raw text");
                ExpertAnswer {
                    version: state.iteration,
                    details: response,
                    confidence: 0.5,
                    ..Default::default()
                }
            }
        };

        state.current_answer = Some(answer.clone());
        Ok(answer)
    }

    /// Phase 3: the critic scores the current answer.
    ///
    /// Unparseable output degrades to a neutral non-passing review so the
    /// loop keeps moving without fabricating criticism.
    async fn critic_review(&self, state: &mut DebateState) -> Result<CriticReview, CallerError> {
        let prompt = prompts::critic_review(state, self.config.score_threshold);
        let response = self.callers.critic.invoke(&prompt).await?;

        let review = match parse::extract_json(&response)
            .map_err(|f| f.error)
            .and_then(|map| {
                serde_json::from_value::<CriticReview>(Value::Object(map)).map_err(|e| e.to_string())
            }) {
            Ok(mut review) => {
                if review.review_version == 0 {
                    review.review_version = state.iteration;
                }
                review
            }
            Err(error) => {
                warn!(%error, "critic response unparseable, using neutral review");
                CriticReview {
                    review_version: state.iteration,
                    overall_score: 70.0,
                    passed: false,
                    suggestions: vec!["Review the answer for clarity and completeness.".to_string()],
                    confidence: 0.5,
                    ..Default::default()
                }
            }
        };

        state.current_review = Some(review.clone());
        Ok(review)
    }

    /// Phase 4: the moderator decides continue-or-end.
    ///
    /// Termination is decided by hard rules in strict precedence; the
    /// model's own decision is consulted last. A parse failure leaves an
    /// empty result map and the hard rules still apply.
    async fn moderator_synthesize(
        &self,
        state: &mut DebateState,
        conversation_id: Option<&str>,
    ) -> Result<(), CallerError> {
        let prompt = prompts::moderator_synthesize(state, self.config.score_threshold);
        let response = self.callers.moderator.invoke(&prompt).await?;

        let result = match parse::extract_json(&response) {
            Ok(map) => map,
            Err(failure) => {
                warn!(error = %failure.error, "moderator synthesize response unparseable, applying hard rules only");
                Map::new()
            }
        };

        let (score, passed) = state
            .current_review
            .as_ref()
            .map(|r| (r.overall_score, r.passed))
            .unwrap_or((0.0, false));
        let iteration = state.iteration;

        let termination = if passed || score >= self.config.score_threshold {
            Some(if score >= self.config.score_threshold {
                TerminationReason::ScoreThreshold
            } else {
                TerminationReason::ExplicitPass
            })
        } else if iteration >= state.max_iterations {
            Some(TerminationReason::MaxIterations)
        } else if str_field(&result, "decision") == Some("end") {
            Some(
                str_field(&result, "termination_reason")
                    .map(parse_termination)
                    .unwrap_or(TerminationReason::ModeratorDecision),
            )
        } else {
            None
        };

        let iteration_summary = str_field(&result, "iteration_summary").map(str::to_string);

        if let Some(id) = conversation_id {
            self.record_analysis(
                id,
                MessageType::ModeratorSynthesize,
                &synthesize_analysis(&result, termination),
                Some(iteration),
            )
            .await;
        }

        match termination {
            Some(reason) => {
                // On the end path the summary is the model's or nothing;
                // the final answer supersedes it.
                if let Some(summary) = iteration_summary {
                    append_summary(&mut state.previous_summary, &summary);
                }
                let final_answer = str_field(&result, "final_answer")
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback_final_answer(state.current_answer.as_ref()));
                state.status = DebateStatus::Completed;
                state.final_answer = Some(final_answer);
                state.termination_reason = Some(reason);
                debug!(?reason, iteration, "debate ended");
            }
            None => {
                let summary = iteration_summary.unwrap_or_else(|| {
                    prompts::fallback_iteration_summary(
                        iteration,
                        state.current_answer.as_ref(),
                        state.current_review.as_ref(),
                    )
                });
                append_summary(&mut state.previous_summary, &summary);
                let guidance = str_field(&result, "improvement_guidance")
                    .unwrap_or("Please continue improving the answer.")
                    .to_string();
                state.iteration = iteration + 1;
                state.current_task = guidance.clone();
                state.improvement_guidance = guidance;
                debug!(next_iteration = state.iteration, "debate continues");
            }
        }
        Ok(())
    }

    async fn record_user_query(&self, conversation_id: &str, question: &str) {
        let is_new = match self.store.get(conversation_id).await {
            Ok(record) => record.is_none(),
            Err(e) => {
                warn!(error = %e, "conversation lookup failed");
                false
            }
        };
        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                MessageRole::User,
                question,
                Some(MessageType::UserQuery),
                None,
            )
            .await
        {
            warn!(error = %e, "failed to persist user query");
        }
        if is_new {
            if let Err(e) = self
                .store
                .set_title(conversation_id, &derive_title(question))
                .await
            {
                warn!(error = %e, "failed to set conversation title");
            }
        }
    }

    async fn load_turn_context(&self, conversation_id: &str) -> (String, String) {
        let previous_summary = match self.store.get(conversation_id).await {
            Ok(Some(record)) => record
                .metadata
                .pointer("/debate_state/previous_summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "failed to load debate state");
                String::new()
            }
        };

        let conversation_context = match self.store.get_messages(conversation_id).await {
            Ok(messages) => compress::compress(&messages, DEFAULT_EXCHANGE_LIMIT),
            Err(e) => {
                warn!(error = %e, "failed to load history for compression");
                String::new()
            }
        };

        (previous_summary, conversation_context)
    }

    async fn record_transcript<T: serde::Serialize>(
        &self,
        conversation_id: &str,
        message_type: MessageType,
        payload: Option<&T>,
        iteration: u32,
    ) {
        let Some(payload) = payload else { return };
        let content = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize transcript payload");
                return;
            }
        };
        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                MessageRole::System,
                &content,
                Some(message_type),
                Some(iteration),
            )
            .await
        {
            warn!(error = %e, "failed to persist transcript message");
        }
    }

    async fn record_analysis(
        &self,
        conversation_id: &str,
        message_type: MessageType,
        analysis: &Value,
        iteration: Option<u32>,
    ) {
        let content = analysis.to_string();
        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                MessageRole::System,
                &content,
                Some(message_type),
                iteration,
            )
            .await
        {
            warn!(error = %e, "failed to persist analysis message");
        }
    }

    async fn record_final_answer(
        &self,
        conversation_id: &str,
        final_answer: &str,
        state: &DebateState,
    ) {
        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                MessageRole::Assistant,
                final_answer,
                Some(MessageType::FinalAnswer),
                None,
            )
            .await
        {
            warn!(error = %e, "failed to persist final answer");
        }
        self.save_debate_state(conversation_id, state).await;
    }

    /// Carry the compressed window into the next turn's metadata.
    async fn save_debate_state(&self, conversation_id: &str, state: &DebateState) {
        let context = match self.store.get_messages(conversation_id).await {
            Ok(messages) => compress::compress(&messages, DEFAULT_EXCHANGE_LIMIT),
            Err(e) => {
                warn!(error = %e, "failed to rebuild conversation context");
                String::new()
            }
        };
        let debate_state = json!({
            "previous_summary": state.previous_summary,
            "last_iteration": state.iteration,
            "conversation_context": context,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = self
            .store
            .merge_metadata(conversation_id, json!({"debate_state": debate_state}))
            .await
        {
            warn!(error = %e, "failed to save debate state");
        }
    }
}

fn cancelled(input_rx: &mut mpsc::UnboundedReceiver<EngineInput>) -> bool {
    matches!(input_rx.try_recv(), Ok(EngineInput::Cancel))
}

fn generic_task(question: &str) -> String {
    format!("Analyze and answer the following question comprehensively: {question}")
}

fn derive_title(question: &str) -> String {
    if question.chars().count() > TITLE_CHAR_LIMIT {
        let mut title: String = question.chars().take(TITLE_CHAR_LIMIT).collect();
        title.push_str("...");
        title
    } else {
        question.to_string()
    }
}

fn parse_termination(raw: &str) -> TerminationReason {
    match raw {
        "score_threshold" => TerminationReason::ScoreThreshold,
        "explicit_pass" => TerminationReason::ExplicitPass,
        "max_iterations" => TerminationReason::MaxIterations,
        "convergence" => TerminationReason::Convergence,
        _ => TerminationReason::ModeratorDecision,
    }
}

fn fallback_final_answer(answer: Option<&ExpertAnswer>) -> String {
    let answer = answer.cloned().unwrap_or_default();
    format!(
        "## Answer\n\n{}\n\n## Conclusion\n\n{}\n",
        answer.details, answer.conclusion
    )
}

fn append_summary(previous_summary: &mut String, iteration_summary: &str) {
    if !previous_summary.is_empty() {
        previous_summary.push('\n');
    }
    previous_summary.push_str(iteration_summary);
}

fn init_analysis(map: &Map<String, Value>) -> Value {
    json!({
        "intent": map.get("intent"),
        "key_constraints": map.get("key_constraints"),
        "complexity": map.get("complexity"),
        "complexity_reason": map.get("complexity_reason"),
        "decision": map.get("decision"),
    })
}

fn synthesize_analysis(map: &Map<String, Value>, termination: Option<TerminationReason>) -> Value {
    json!({
        "feedback_validation": map.get("feedback_validation"),
        "decision": map.get("decision"),
        "improvement_guidance": map.get("improvement_guidance"),
        "iteration_summary": map.get("iteration_summary"),
        "termination_reason": termination,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::ai::StreamPart;
    use crate::storage::MemoryStore;

    enum Script {
        Text(String),
        Fail(String),
    }

    /// Caller returning canned responses in order.
    struct ScriptedCaller {
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedCaller {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
            })
        }
    }

    #[async_trait]
    impl ModelCaller for ScriptedCaller {
        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _prompt: &str,
        ) -> Result<mpsc::UnboundedReceiver<StreamPart>, CallerError> {
            let script = self
                .scripts
                .lock()
                .pop_front()
                .unwrap_or(Script::Text("{}".to_string()));
            let (tx, rx) = mpsc::unbounded_channel();
            match script {
                Script::Text(text) => {
                    let _ = tx.send(StreamPart::TextDelta { delta: text });
                }
                Script::Fail(message) => {
                    let _ = tx.send(StreamPart::Error { error: message });
                }
            }
            Ok(rx)
        }
    }

    fn fenced(value: Value) -> Script {
        Script::Text(format!("```json\n{value}\n```"))
    }

    fn delegate_init() -> Script {
        fenced(json!({
            "intent": "explain",
            "complexity": "complex",
            "decision": "delegate_expert",
            "task_for_expert": "Analyze the question"
        }))
    }

    fn expert_answer(version: u32) -> Script {
        fenced(json!({
            "version": version,
            "understanding": "the question",
            "core_points": ["p1"],
            "details": "detailed argument",
            "conclusion": "therefore",
            "confidence": 0.8
        }))
    }

    fn critic(score: f64, passed: bool) -> Script {
        fenced(json!({
            "overall_score": score,
            "passed": passed,
            "issues": [],
            "suggestions": ["tighten the argument"]
        }))
    }

    fn synth_continue() -> Script {
        fenced(json!({
            "decision": "continue",
            "improvement_guidance": "add examples",
            "iteration_summary": "round summary"
        }))
    }

    fn synth_end(final_answer: &str) -> Script {
        fenced(json!({
            "decision": "end",
            "final_answer": final_answer,
            "iteration_summary": "final round"
        }))
    }

    fn engine(
        moderator: Vec<Script>,
        expert: Vec<Script>,
        critic_scripts: Vec<Script>,
        store: Arc<MemoryStore>,
        config: DebateConfig,
    ) -> DebateEngine {
        DebateEngine::new(
            RoleCallers {
                moderator: ScriptedCaller::new(moderator),
                expert: ScriptedCaller::new(expert),
                critic: ScriptedCaller::new(critic_scripts),
            },
            store,
            config,
        )
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<DebateEvent>) -> Vec<DebateEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn config(max_iterations: u32) -> DebateConfig {
        DebateConfig {
            moderator_model: "m".to_string(),
            expert_model: "e".to_string(),
            critic_model: "c".to_string(),
            max_iterations,
            score_threshold: 80.0,
        }
    }

    #[tokio::test]
    async fn test_direct_answer_emits_only_phase_start_and_done() {
        let moderator = vec![fenced(json!({
            "complexity": "simple",
            "decision": "direct_answer",
            "direct_answer": "Paris."
        }))];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, vec![], vec![], store.clone(), config(3));

        let (rx, _input) = engine.run("Capital of France?".to_string(), Some("c1".to_string()));
        let events = drain(rx).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            DebateEvent::PhaseStart {
                phase: DebatePhase::ModeratorInit,
                iteration: 0
            }
        ));
        match &events[1] {
            DebateEvent::Done {
                final_answer,
                was_direct_answer,
                termination_reason,
                total_iterations,
            } => {
                assert_eq!(final_answer, "Paris.");
                assert!(was_direct_answer);
                assert_eq!(*termination_reason, TerminationReason::SimpleQuestion);
                assert_eq!(*total_iterations, 0);
            }
            other => panic!("expected Done, got {other:?}"),
        }

        let messages = store.get_messages("c1").await.unwrap();
        let types: Vec<_> = messages.iter().map(|m| m.message_type).collect();
        assert!(types.contains(&Some(MessageType::UserQuery)));
        assert!(types.contains(&Some(MessageType::FinalAnswer)));
    }

    #[tokio::test]
    async fn test_single_iteration_pass_event_order() {
        let moderator = vec![delegate_init(), synth_end("the final answer")];
        let expert = vec![expert_answer(1)];
        let critic_scripts = vec![critic(92.0, true)];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store.clone(), config(3));

        let (rx, _input) = engine.run("Why async?".to_string(), Some("c1".to_string()));
        let events = drain(rx).await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                DebateEvent::PhaseStart { .. } => "phase_start",
                DebateEvent::ExpertAnswer { .. } => "expert_answer",
                DebateEvent::CriticReview { .. } => "critic_review",
                DebateEvent::IterationComplete { .. } => "iteration_complete",
                DebateEvent::Done { .. } => "done",
                DebateEvent::Error { .. } => "error",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "phase_start",
                "phase_start",
                "expert_answer",
                "phase_start",
                "critic_review",
                "phase_start",
                "iteration_complete",
                "done"
            ]
        );

        match events.last().unwrap() {
            DebateEvent::Done {
                final_answer,
                was_direct_answer,
                termination_reason,
                total_iterations,
            } => {
                assert_eq!(final_answer, "the final answer");
                assert!(!was_direct_answer);
                assert_eq!(*termination_reason, TerminationReason::ScoreThreshold);
                assert_eq!(*total_iterations, 1);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_max_iterations_bound() {
        let moderator = vec![delegate_init(), synth_continue(), synth_continue()];
        let expert = vec![expert_answer(1), expert_answer(2)];
        let critic_scripts = vec![critic(60.0, false), critic(65.0, false)];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store, config(2));

        let (rx, _input) = engine.run("hard question".to_string(), None);
        let events = drain(rx).await;

        let iterations: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                DebateEvent::IterationComplete { iteration, .. } => Some(*iteration),
                _ => None,
            })
            .collect();
        assert_eq!(iterations, vec![1, 2]);

        match events.last().unwrap() {
            DebateEvent::Done {
                termination_reason,
                total_iterations,
                ..
            } => {
                assert_eq!(*termination_reason, TerminationReason::MaxIterations);
                assert_eq!(*total_iterations, 2);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_pass_overrides_moderator_continue() {
        // Review passes below the numeric threshold; precedence rule 1 ends
        // the debate even though the moderator voted to continue.
        let moderator = vec![delegate_init(), synth_continue()];
        let expert = vec![expert_answer(1)];
        let critic_scripts = vec![critic(75.0, true)];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store, config(3));

        let (rx, _input) = engine.run("q".to_string(), None);
        let events = drain(rx).await;

        match events.last().unwrap() {
            DebateEvent::Done {
                termination_reason, ..
            } => assert_eq!(*termination_reason, TerminationReason::ExplicitPass),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_summary_fallback_applies_only_while_continuing() {
        // A continue verdict without an iteration_summary appends the
        // generated one; an end verdict without one appends nothing.
        let moderator = vec![
            delegate_init(),
            fenced(json!({"decision": "continue", "improvement_guidance": "expand"})),
            fenced(json!({"decision": "end", "final_answer": "done"})),
        ];
        let expert = vec![expert_answer(1), expert_answer(2)];
        let critic_scripts = vec![critic(60.0, false), critic(90.0, true)];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store.clone(), config(3));

        let (rx, _input) = engine.run("q".to_string(), Some("c1".to_string()));
        let events = drain(rx).await;

        let summaries: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                DebateEvent::IterationComplete { summary, .. } => Some(summary.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].starts_with("Iteration 1:"));
        assert_eq!(summaries[1], summaries[0]);

        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(
            record
                .metadata
                .pointer("/debate_state/previous_summary")
                .and_then(|v| v.as_str())
                .unwrap(),
            summaries[0]
        );
    }

    #[tokio::test]
    async fn test_parse_failures_recover_per_phase() {
        let moderator = vec![
            Script::Text("no json here".to_string()),
            Script::Text("also not json".to_string()),
        ];
        let expert = vec![Script::Text("plain prose answer".to_string())];
        let critic_scripts = vec![Script::Text("???".to_string())];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store, config(1));

        let (rx, _input) = engine.run("q".to_string(), None);
        let events = drain(rx).await;

        let answer = events
            .iter()
            .find_map(|e| match e {
                DebateEvent::ExpertAnswer { answer, .. } => Some(answer.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(answer.details, "plain prose answer");
        assert_eq!(answer.confidence, 0.5);

        let review = events
            .iter()
            .find_map(|e| match e {
                DebateEvent::CriticReview { review, .. } => Some(review.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(review.overall_score, 70.0);
        assert!(!review.passed);

        // Hard rules still end at max_iterations despite the unparseable
        // synthesize response.
        match events.last().unwrap() {
            DebateEvent::Done {
                termination_reason,
                final_answer,
                ..
            } => {
                assert_eq!(*termination_reason, TerminationReason::MaxIterations);
                assert!(final_answer.contains("plain prose answer"));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal_error() {
        let moderator = vec![Script::Fail("connection reset".to_string())];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, vec![], vec![], store.clone(), config(3));

        let (rx, _input) = engine.run("q".to_string(), Some("c1".to_string()));
        let events = drain(rx).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DebateEvent::PhaseStart { .. }));
        assert!(matches!(events[1], DebateEvent::Error { .. }));

        // No assistant message persisted for a failed turn.
        let messages = store.get_messages("c1").await.unwrap();
        assert!(messages.iter().all(|m| m.role != MessageRole::Assistant));
    }

    #[tokio::test]
    async fn test_cancel_stops_between_phases() {
        let moderator = vec![delegate_init()];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, vec![], vec![], store, config(3));

        // Current-thread runtime: the engine task does not start until we
        // yield, so the cancel input is buffered ahead of the first check.
        let (rx, input) = engine.run("q".to_string(), None);
        input.send(EngineInput::Cancel).unwrap();
        let events = drain(rx).await;

        assert!(events.iter().all(|e| !e.is_terminal()));
        assert!(matches!(
            events.last(),
            Some(DebateEvent::PhaseStart {
                phase: DebatePhase::ModeratorInit,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_persists_transcript_and_debate_state() {
        let moderator = vec![delegate_init(), synth_end("done answer")];
        let expert = vec![expert_answer(1)];
        let critic_scripts = vec![critic(90.0, true)];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, expert, critic_scripts, store.clone(), config(3));

        let (rx, _input) = engine.run(
            "a question that is well under fifty characters".to_string(),
            Some("c1".to_string()),
        );
        drain(rx).await;

        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(
            record.title.as_deref(),
            Some("a question that is well under fifty characters")
        );
        let summary = record
            .metadata
            .pointer("/debate_state/previous_summary")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(summary.contains("final round"));

        let types: Vec<_> = store
            .get_messages("c1")
            .await
            .unwrap()
            .iter()
            .map(|m| m.message_type)
            .collect();
        for expected in [
            Some(MessageType::UserQuery),
            Some(MessageType::ModeratorInit),
            Some(MessageType::ExpertAnswer),
            Some(MessageType::CriticReview),
            Some(MessageType::ModeratorSynthesize),
            Some(MessageType::FinalAnswer),
        ] {
            assert!(types.contains(&expected), "missing {expected:?}");
        }
    }

    #[tokio::test]
    async fn test_long_question_title_truncated() {
        let moderator = vec![fenced(json!({
            "complexity": "simple",
            "decision": "direct_answer",
            "direct_answer": "yes"
        }))];
        let store = Arc::new(MemoryStore::new());
        let engine = engine(moderator, vec![], vec![], store.clone(), config(3));

        let question = "x".repeat(80);
        let (rx, _input) = engine.run(question, Some("c1".to_string()));
        drain(rx).await;

        let title = store.get("c1").await.unwrap().unwrap().title.unwrap();
        assert_eq!(title, format!("{}...", "x".repeat(50)));
    }

    #[tokio::test]
    async fn test_second_turn_reuses_previous_summary_and_context() {
        let store = Arc::new(MemoryStore::new());

        let first = engine(
            vec![delegate_init(), synth_end("first final")],
            vec![expert_answer(1)],
            vec![critic(90.0, true)],
            store.clone(),
            config(3),
        );
        let (rx, _input) = first.run("first question".to_string(), Some("c1".to_string()));
        drain(rx).await;

        let second = engine(
            vec![fenced(json!({
                "complexity": "simple",
                "decision": "direct_answer",
                "direct_answer": "follow-up answer"
            }))],
            vec![],
            vec![],
            store.clone(),
            config(3),
        );
        let (rx, _input) = second.run("and then?".to_string(), Some("c1".to_string()));
        drain(rx).await;

        let record = store.get("c1").await.unwrap().unwrap();
        let context = record
            .metadata
            .pointer("/debate_state/conversation_context")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(context.contains("User: first question"));
        assert!(context.contains("Assistant: first final"));
        assert!(context.contains("User: and then?"));
    }
}
