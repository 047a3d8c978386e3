//! Text sent to (or pretending to come from) the voice agent.

use crate::calls::Task;

const PERSONA: &str = "You are CallMeAI, a supportive accountability partner.";

/// Render the provider script: persona, one numbered instruction per task, closing rules.
pub fn conversation_script(schedule_name: &str, tasks: &[Task]) -> String {
    let task_lines = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| format!("{}. {}", index + 1, task_instruction(task)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{PERSONA} The user scheduled a call named \"{schedule_name}\".\n\
         \n\
         Your goal is to check in on their daily goals and build lasting habits. \
         Be warm, encouraging, and concise.\n\
         \n\
         Here are their tasks to ask about:\n\
         {task_lines}\n\
         \n\
         Instructions:\n\
         1. Greet them warmly and introduce yourself as CallMeAI\n\
         2. Ask about each task one by one\n\
         3. Listen to their responses and be encouraging\n\
         4. After all tasks, provide a brief motivational message\n\
         5. Thank them and end the call\n\
         \n\
         Keep the conversation natural and supportive. This should take 3-5 minutes total."
    )
}

fn task_instruction(task: &Task) -> String {
    let unit = task.unit.as_deref().map(str::trim).filter(|u| !u.is_empty());
    match (task.target_value.filter(|t| *t != 0.0), unit) {
        (Some(target), Some(unit)) => format!(
            "\"{}\": Target is {} {unit}. Ask how many {unit} they completed today.",
            task.title,
            format_number(target)
        ),
        _ => format!(
            "\"{}\": Ask if they made progress on this goal today.",
            task.title
        ),
    }
}

/// `8.0` renders as `8`, `2.5` stays `2.5`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Scripted lines streamed by the simulated call, in order.
pub fn simulated_transcript(full_name: Option<&str>, tasks: &[Task]) -> Vec<String> {
    let name = full_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    let title = |idx: usize| {
        tasks
            .get(idx)
            .map(|t| t.title.as_str())
            .unwrap_or("(no task)")
    };

    vec![
        format!("Hi {name}, this is CallMeAI checking in about your tasks."),
        format!("First task: {}. How did you get on today?", title(0)),
        format!("Second task: {}.", title(1)),
        "Thanks for sharing, that's helpful. Keep it up!".to_string(),
        "Call complete. Logged your responses.".to_string(),
    ]
}
