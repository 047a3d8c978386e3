//! Keyword/number heuristics that turn a finished transcript into per-task outcomes.
//!
//! This is deliberately not NLP. Sarcasm, hedging and answers given far away
//! from the task's name will be misclassified.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::calls::Task;

/// Characters kept on each side of the task title when extracting context.
pub const CONTEXT_RADIUS_CHARS: usize = 120;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("number regex"));
static TARGET_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:target|goal)(?:\s+(?:is|of|was))?\s*[:=]?\s*$").expect("target regex")
});
static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:done|completed|yes|finished|achieved|met)\b").expect("affirmative regex")
});
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:not|no|didn't|didn’t|did not|failed|never)\b").expect("negative regex")
});
static MILD_POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:good|well|great|improved|better)\b").expect("mild positive regex")
});

/// Inference for a task that was mentioned in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub task_title: String,
    /// Transcript excerpt around the title mention
    pub inferred_text: String,
    /// First number in the excerpt that is not a restated target
    pub response_value: Option<f64>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Recommendation {
    pub task_id: Uuid,
    pub title: String,
    pub suggestion: String,
}

/// Infer outcomes for every task whose title occurs (case-insensitively) in `transcript`.
/// Tasks that are never mentioned produce no outcome.
pub fn infer_outcomes(tasks: &[Task], transcript: &str) -> Vec<TaskOutcome> {
    let transcript = transcript.trim();
    if transcript.is_empty() {
        return Vec::new();
    }
    tasks
        .iter()
        .filter_map(|task| infer_outcome(task, transcript))
        .collect()
}

fn infer_outcome(task: &Task, transcript: &str) -> Option<TaskOutcome> {
    let title = task.title.trim();
    if title.is_empty() {
        return None;
    }
    let pattern = Regex::new(&format!("(?i){}", regex::escape(title))).ok()?;
    let mention = pattern.find(transcript)?;

    let start = back_chars(transcript, mention.start(), CONTEXT_RADIUS_CHARS);
    let end = forward_chars(transcript, mention.end(), CONTEXT_RADIUS_CHARS);
    let window = &transcript[start..end];

    // Numbers and keywords inside the title itself ("No sugar", "Run 5k") are not answers.
    let context = format!(
        "{} {}",
        &transcript[start..mention.start()],
        &transcript[mention.end()..end]
    );

    let response_value = first_answer_number(&context);

    let mut completed: Option<bool> = None;
    if let (Some(value), Some(target)) = (response_value, task.target_value) {
        if value >= target {
            completed = Some(true);
        }
    }
    if AFFIRMATIVE.is_match(&context) {
        completed = Some(true);
    }
    // Checked after the affirmative set so explicit negation wins.
    if NEGATIVE.is_match(&context) {
        completed = Some(false);
    }
    if completed.is_none() && MILD_POSITIVE.is_match(&context) {
        completed = Some(true);
    }

    Some(TaskOutcome {
        task_id: task.id,
        task_title: task.title.clone(),
        inferred_text: window.to_string(),
        response_value,
        completed: completed.unwrap_or(false),
    })
}

fn first_answer_number(context: &str) -> Option<f64> {
    NUMBER
        .find_iter(context)
        .filter(|m| !TARGET_PREFIX.is_match(&context[..m.start()]))
        .find_map(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
}

/// Byte index `n` characters before `idx` (clamped to 0).
fn back_chars(s: &str, idx: usize, n: usize) -> usize {
    if n == 0 {
        return idx;
    }
    s[..idx]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte index `n` characters after `idx` (clamped to the end).
fn forward_chars(s: &str, idx: usize, n: usize) -> usize {
    s[idx..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| idx + i)
        .unwrap_or(s.len())
}

/// Follow-up suggestions for tasks that were not completed or never came up.
pub fn recommendations(tasks: &[Task], outcomes: &[TaskOutcome]) -> Vec<Recommendation> {
    tasks
        .iter()
        .filter(|task| {
            !outcomes
                .iter()
                .any(|outcome| outcome.task_id == task.id && outcome.completed)
        })
        .map(|task| Recommendation {
            task_id: task.id,
            title: task.title.clone(),
            suggestion: format!(
                "Try breaking \"{}\" into smaller steps or schedule it on easier days.",
                task.title
            ),
        })
        .collect()
}
