//! Plan Parser: extraction of structured `@@@task` blocks from free-form LLM
//! text, plus an alternative JSON-plan ingestion path for external callers.
//!
//! Grounded in the donor agent crate's `planner.rs` JSON-extraction idiom
//! (fence stripping, graceful degradation on malformed input) but the
//! grammar itself is the `@@@task` block format rather than a raw JSON
//! response, since here the parser consumes already-produced free text
//! instead of driving the model call itself.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One task specification recovered from plan text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    pub title: String,
    pub objective: String,
    pub scope: String,
    pub acceptance_criteria: Vec<String>,
    pub verification_commands: Vec<String>,
}

const BLOCK_OPEN: &str = "@@@task";
const BLOCK_CLOSE: &str = "@@@";

/// Parse every `@@@task ... @@@` block out of `text`, preserving textual
/// order. Blocks missing a title are discarded with a warning; everything
/// outside recognized blocks is ignored.
pub fn parse_plan(text: &str) -> Vec<TaskSpec> {
    let mut specs = Vec::new();
    let mut rest = text;

    while let Some(open_pos) = rest.find(BLOCK_OPEN) {
        let after_open = &rest[open_pos + BLOCK_OPEN.len()..];
        let Some(close_pos) = after_open.find(BLOCK_CLOSE) else {
            break;
        };
        let body = &after_open[..close_pos];
        match parse_block(body) {
            Some(spec) => specs.push(spec),
            None => warn!("discarding @@@task block with no title"),
        }
        rest = &after_open[close_pos + BLOCK_CLOSE.len()..];
    }

    specs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Title,
    Objective,
    Scope,
    DefinitionOfDone,
    Verification,
    None,
}

fn classify_heading(line: &str) -> Option<Section> {
    let trimmed = line.trim().to_ascii_lowercase();
    if trimmed.starts_with("# ") {
        return Some(Section::Title);
    }
    if !trimmed.starts_with("## ") {
        return None;
    }
    let heading = trimmed.trim_start_matches("## ").trim();
    match heading {
        "objective" => Some(Section::Objective),
        "scope" => Some(Section::Scope),
        "definition of done" => Some(Section::DefinitionOfDone),
        "verification" => Some(Section::Verification),
        _ => None,
    }
}

fn parse_block(body: &str) -> Option<TaskSpec> {
    let mut spec = TaskSpec::default();
    let mut current = Section::None;
    let mut have_title = false;

    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(section) = classify_heading(raw_line) {
            if section == Section::Title {
                spec.title = raw_line.trim_start_matches('#').trim().to_string();
                have_title = true;
            }
            current = section;
            continue;
        }

        match current {
            Section::Title | Section::None => {
                // Unknown section text before any known heading is preserved
                // under `objective`.
                if have_title {
                    append_free_text(&mut spec.objective, line);
                }
            }
            Section::Objective => append_free_text(&mut spec.objective, line),
            Section::Scope => append_free_text(&mut spec.scope, strip_bullet(line)),
            Section::DefinitionOfDone => spec.acceptance_criteria.push(strip_bullet(line).to_string()),
            Section::Verification => spec.verification_commands.push(strip_bullet(line).to_string()),
        }
    }

    if !have_title || spec.title.is_empty() {
        return None;
    }
    Some(spec)
}

fn strip_bullet(line: &str) -> &str {
    line.strip_prefix("- ").unwrap_or(line)
}

fn append_free_text(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}

// ---------------------------------------------------------------------------
// JSON-plan ingestion
// ---------------------------------------------------------------------------

/// Multi-agent execution strategy hint carried by an external JSON plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    SingleAgent,
    MultiAgent,
}

/// An externally supplied plan, as an alternative to `@@@task` text.
#[derive(Debug, Clone)]
pub struct JsonPlan {
    pub tasks: Vec<TaskSpec>,
    pub strategy: PlanStrategy,
    pub max_parallelism: u32,
}

/// Parse a JSON plan object, optionally wrapped in a markdown code fence.
/// Missing `strategy` defaults to `multi_agent`; missing `max_parallelism`
/// defaults to 1 and is clamped to `[1, 5]`.
pub fn parse_json_plan(text: &str) -> Option<JsonPlan> {
    let json_text = extract_json_fence(text).unwrap_or(text);
    let value: serde_json::Value = serde_json::from_str(json_text.trim()).ok()?;

    let tasks_value = value.get("tasks")?.as_array()?;
    let tasks: Vec<TaskSpec> = tasks_value
        .iter()
        .filter_map(|task_value| {
            Some(TaskSpec {
                title: task_value.get("title")?.as_str()?.to_string(),
                objective: task_value
                    .get("objective")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                scope: task_value
                    .get("scope")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                acceptance_criteria: string_array(task_value.get("acceptanceCriteria")),
                verification_commands: string_array(task_value.get("verificationCommands")),
            })
        })
        .collect();

    let strategy = match value.get("strategy").and_then(|v| v.as_str()) {
        Some("single_agent") => PlanStrategy::SingleAgent,
        _ => PlanStrategy::MultiAgent,
    };

    let max_parallelism = value
        .get("max_parallelism")
        .and_then(|v| v.as_u64())
        .unwrap_or(1)
        .clamp(1, 5) as u32;

    Some(JsonPlan {
        tasks,
        strategy,
        max_parallelism,
    })
}

fn string_array(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn extract_json_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let after_lang = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let end = after_lang.find("```")?;
    Some(after_lang[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "\
@@@task
# Add README
## Objective
Document the project
## Scope
- touch README.md only
## Definition of Done
- README exists
- README mentions usage
## Verification
- cat README.md
@@@
";

    #[test]
    fn parses_canonical_block() {
        let specs = parse_plan(CANONICAL);
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.title, "Add README");
        assert_eq!(spec.objective, "Document the project");
        assert_eq!(spec.scope, "touch README.md only");
        assert_eq!(spec.acceptance_criteria, vec!["README exists", "README mentions usage"]);
        assert_eq!(spec.verification_commands, vec!["cat README.md"]);
    }

    #[test]
    fn ignores_text_outside_blocks() {
        let text = format!("Here is my plan:\n{CANONICAL}\nThanks!");
        let specs = parse_plan(&text);
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn multiple_blocks_preserve_order() {
        let text = format!(
            "@@@task\n# First\n## Objective\nDo first\n@@@\n{CANONICAL}",
        );
        let specs = parse_plan(&text);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].title, "First");
        assert_eq!(specs[1].title, "Add README");
    }

    #[test]
    fn missing_title_is_discarded() {
        let text = "@@@task\n## Objective\nNo title here\n@@@";
        let specs = parse_plan(text);
        assert!(specs.is_empty());
    }

    #[test]
    fn missing_optional_sections_yield_empty_arrays() {
        let text = "@@@task\n# Bare task\n## Objective\nJust this\n@@@";
        let specs = parse_plan(text);
        assert_eq!(specs.len(), 1);
        assert!(specs[0].acceptance_criteria.is_empty());
        assert!(specs[0].verification_commands.is_empty());
    }

    #[test]
    fn zero_tasks_for_empty_input() {
        assert!(parse_plan("no tasks here at all").is_empty());
    }

    #[test]
    fn json_plan_defaults_strategy_and_parallelism() {
        let text = r#"{"tasks": [{"title": "T1"}]}"#;
        let plan = parse_json_plan(text).unwrap();
        assert_eq!(plan.strategy, PlanStrategy::MultiAgent);
        assert_eq!(plan.max_parallelism, 1);
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn json_plan_clamps_max_parallelism() {
        let text = r#"{"tasks": [], "max_parallelism": 10}"#;
        let plan = parse_json_plan(text).unwrap();
        assert_eq!(plan.max_parallelism, 5);

        let text = r#"{"tasks": [], "max_parallelism": 0}"#;
        let plan = parse_json_plan(text).unwrap();
        assert_eq!(plan.max_parallelism, 1);
    }

    #[test]
    fn json_plan_extracts_from_fence() {
        let text = "```json\n{\"tasks\": [{\"title\": \"T1\"}]}\n```";
        let plan = parse_json_plan(text).unwrap();
        assert_eq!(plan.tasks.len(), 1);
    }
}
