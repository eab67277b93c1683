//! Prompt builders for the four debate phases.
//!
//! Each builder produces the complete prompt for one model call. The drift
//! guard (answers must stay anchored to the original question) and the
//! quote rule (criticism must cite the answer text) live in the prompt
//! wording; their enforcement lives in the engine.

use super::state::{CriticIssue, CriticReview, DebateState, ExpertAnswer};

/// Moderator triage: intent, complexity, direct-answer-or-delegate.
pub fn moderator_init(question: &str, conversation_context: &str) -> String {
    let context_section = if conversation_context.is_empty() {
        String::new()
    } else {
        format!("## Prior conversation\n{conversation_context}\n\n")
    };

    format!(
        r#"You are an experienced discussion moderator and question analyst. Analyze the user's question, assess its complexity, and decide how to handle it.

{context_section}## User question
{question}

## Your tasks

1. **Intent**: understand what the user actually wants to know.
2. **Complexity**: judge how hard the question is.
3. **Decision**: answer directly, or delegate to an expert debate.

## Complexity criteria

**simple** (answer directly): factual questions with a single clear answer that need no multi-angle analysis. Examples: "Who created Python?", "What does HTTP status 200 mean?"

**moderate** (needs an expert): requires some explanation and reasoning, possibly several related factors. Example: "Explain the design principles of RESTful APIs."

**complex** (needs a full debate): multi-angle analysis, comparisons and trade-offs, open-ended or contested topics that need deep argumentation. Examples: "What are the pros and cons of microservices?", "How do I choose the right database?"

## Output format

Reply with a JSON object:

```json
{{
    "intent": "concise description of the user's intent",
    "key_constraints": ["constraint 1", "constraint 2"],
    "complexity": "simple|moderate|complex",
    "complexity_reason": "why you judged it so",
    "decision": "direct_answer|delegate_expert",
    "direct_answer": "the answer if the question is simple, otherwise null",
    "task_for_expert": "the task for the expert if delegating, otherwise null"
}}
```

Make sure the JSON is valid and parseable."#
    )
}

/// Expert answer generation or refinement.
pub fn expert_generate(state: &DebateState, supported_feedback: &[&CriticIssue]) -> String {
    let is_first = state.current_answer.is_none();

    let improvement_section = if is_first {
        String::new()
    } else {
        let previous = state
            .current_answer
            .as_ref()
            .map(answer_digest)
            .unwrap_or_default();
        let feedback = if supported_feedback.is_empty() {
            "No verified issues were raised.".to_string()
        } else {
            supported_feedback
                .iter()
                .map(|issue| {
                    format!(
                        "- [{}/{}] {} (quote: \"{}\")",
                        tag(&issue.category),
                        tag(&issue.severity),
                        issue.description,
                        issue.quote
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            r#"## Areas to improve

### Previous answer digest
{previous}

### Verified review feedback
{feedback}

### Moderator guidance
{guidance}

**Important**: make targeted improvements, do not rewrite wholesale. Keep the strengths of the previous answer and record each change in modification_log.

"#,
            guidance = state.improvement_guidance
        )
    };

    let iteration_guidance = if is_first {
        "**First answer**: be as comprehensive as possible, cover every aspect of the question, and pick the most reasonable interpretation if several exist."
    } else {
        "**Refinement**: read the feedback carefully and accept fair criticism; fix the specific problems without heavily rewriting unrelated content; if you disagree with a criticism, say why in details; update confidence to reflect the improved answer."
    };

    format!(
        r#"You are a domain expert. Produce a high-quality answer to the question below.

## Original question
{question}

## Current task
{task}

## Iteration
- Round: {iteration}
- First answer: {is_first}

{improvement_section}## Requirements

1. **Structured**: follow the JSON format exactly.
2. **Anchored**: stay on the original question; do not drift.
3. **Well argued**: give solid reasoning and examples.
4. **Balanced**: present multiple angles on contested topics.

{iteration_guidance}

## Output format

```json
{{
    "version": {iteration},
    "understanding": "1-2 sentence restatement of the question",
    "core_points": ["point 1", "point 2", "point 3"],
    "details": "full argument, markdown allowed",
    "conclusion": "2-3 sentence conclusion",
    "confidence": 0.85,
    "limitations": ["known limitation 1"],
    "modification_log": ["changes made this round"]
}}
```

Notes: confidence is 0-1; modification_log is an empty array on the first answer; the JSON must be valid and parseable."#,
        question = state.original_question,
        task = state.current_task,
        iteration = state.iteration,
    )
}

/// Critic review of the current expert answer.
pub fn critic_review(state: &DebateState, score_threshold: f64) -> String {
    let answer_json = state
        .current_answer
        .as_ref()
        .and_then(|a| serde_json::to_string_pretty(a).ok())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        r#"You are a rigorous academic reviewer. Review the expert's answer thoroughly and objectively.

## Original question
{question}

## Expert answer
```json
{answer_json}
```

## Review dimensions

1. **Logic**: is the argument coherent, free of fallacies, and do the conclusions follow?
2. **Facts**: are the stated facts accurate, are the examples apt, is anything unverifiable?
3. **Completeness**: are the main aspects covered, anything important missing, enough depth?
4. **Relevance**: does the answer stay on the original question, any off-topic content?

## Scoring

- 90-100: excellent, only minor polish left
- 80-89: good, solid with room to improve
- 70-79: fair, clear but fixable problems
- 60-69: passing, needs substantial work
- below 60: failing, needs major revision

## Critical rule

**Every criticism must quote the answer**: the quote field of each issue must contain the exact text you are criticizing. Never criticize content that does not appear in the answer. If you cannot find a supporting quote, the criticism probably does not hold.

## Output format

```json
{{
    "review_version": 1,
    "overall_score": 75,
    "passed": false,
    "issues": [
        {{
            "category": "logic|facts|completeness|relevance",
            "severity": "minor|moderate|major",
            "description": "what is wrong",
            "quote": "exact text from the answer"
        }}
    ],
    "strengths": ["strength 1"],
    "suggestions": ["concrete, actionable suggestion 1"],
    "confidence": 0.9
}}
```

Notes: passed is true when overall_score >= {score_threshold}; suggestions must be concrete and actionable; confidence is 0-1; the JSON must be valid and parseable."#,
        question = state.original_question,
    )
}

/// Moderator synthesis: validate feedback, decide continue-or-end.
pub fn moderator_synthesize(state: &DebateState, score_threshold: f64) -> String {
    let answer_json = state
        .current_answer
        .as_ref()
        .and_then(|a| serde_json::to_string_pretty(a).ok())
        .unwrap_or_else(|| "{}".to_string());
    let review_json = state
        .current_review
        .as_ref()
        .and_then(|r| serde_json::to_string_pretty(r).ok())
        .unwrap_or_else(|| "{}".to_string());
    let summary = if state.previous_summary.is_empty() {
        "(first iteration)"
    } else {
        &state.previous_summary
    };

    format!(
        r#"You are the debate moderator. Synthesize the expert's answer and the review, then decide the next step.

## Original question
{question}

## Iteration {iteration} of at most {max_iterations}

## History summary
{summary}

## This round's expert answer
```json
{answer_json}
```

## This round's review
```json
{review_json}
```

## Your tasks

1. **Validate the review**: is each criticism grounded in quoted text and reasonable?
2. **Check for drift**: does the answer still address the original question?
3. **Decide** whether to continue, ending when any of these hold:
   - score reaches the threshold ({score_threshold})
   - the review explicitly passed (passed=true)
   - two consecutive answers are nearly identical (convergence)
   - the maximum iteration count is reached
   Otherwise continue.

If ending: synthesize the best elements of all iterations into the final answer and state the termination reason.
If continuing: keep the valuable suggestions, drop the unfounded criticism, and give the expert concrete improvement guidance.

## Output format

```json
{{
    "feedback_validation": {{
        "valid_issues": ["verified issues"],
        "invalid_issues": ["filtered criticism and why"],
        "is_on_track": true,
        "drift_warning": "explanation if drifting, otherwise null"
    }},
    "decision": "continue|end",
    "termination_reason": "score_threshold|explicit_pass|max_iterations|convergence|null",
    "improvement_guidance": "concrete guidance for the expert if continuing, otherwise null",
    "final_answer": "the synthesized final answer if ending, otherwise null",
    "iteration_summary": "short summary of this round for the compressed history"
}}
```

Make sure the JSON is valid and parseable."#,
        question = state.original_question,
        iteration = state.iteration,
        max_iterations = state.max_iterations,
    )
}

/// Deterministic fallback summary of one iteration, used when the moderator
/// does not supply `iteration_summary`.
pub fn fallback_iteration_summary(
    iteration: u32,
    answer: Option<&ExpertAnswer>,
    review: Option<&CriticReview>,
) -> String {
    let points = answer
        .map(|a| a.core_points.join("; "))
        .unwrap_or_default();
    let score = review.map(|r| r.overall_score).unwrap_or(0.0);
    format!("Iteration {iteration}: core points [{points}]; review score {score:.0}.")
}

// Short recap of the previous answer; the full JSON would bloat the prompt.
fn answer_digest(answer: &ExpertAnswer) -> String {
    format!(
        "Understanding: {}\nCore points: {}\nConclusion: {}\nConfidence: {:.2}",
        answer.understanding,
        answer.core_points.join("; "),
        answer.conclusion,
        answer.confidence
    )
}

// Wire-format spelling of an enum variant, without the surrounding quotes.
fn tag<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}
