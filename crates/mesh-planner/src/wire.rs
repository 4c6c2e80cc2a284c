//! The plan-JSON wire schema (spec §4.5/§9 "Plan JSON as external
//! contract"): the same validator runs whether the JSON came from the AI
//! path, a client-supplied plan, or (in tests) hand-written fixtures.

use mesh_domain::job::{Plan, ReduceKind, ReduceSpec, TaskGroup, TaskKind, TaskSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWire {
    pub groups: Vec<GroupWire>,
    #[serde(default)]
    pub reduce: Option<ReduceWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupWire {
    #[serde(default)]
    pub index: usize,
    pub tasks: Vec<TaskWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWire {
    pub task_id: String,
    /// Kept as a raw string here (not [`TaskKind`]) so validation can
    /// report "unknown kind" instead of a deserialization error.
    pub kind: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub target_device_id: Option<String>,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceWire {
    pub kind: String,
}

/// Strips a single layer of Markdown code fence (``` or ```json) around a
/// JSON document, if present. Tolerates leading/trailing whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches(['\n', '\r']);
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim(),
        None => after_open.trim(),
    }
}

/// One validation failure, with a human-readable reason suitable for
/// `notes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses and validates a plan-JSON document (after code-fence stripping),
/// per every rule in spec §4.5. Returns the materialized domain [`Plan`] +
/// [`ReduceSpec`] on success.
pub fn parse_and_validate(raw: &str) -> Result<(Plan, ReduceSpec), ValidationError> {
    let stripped = strip_code_fences(raw);
    let wire: PlanWire = serde_json::from_str(stripped)
        .map_err(|e| ValidationError(format!("invalid plan JSON: {e}")))?;
    validate_wire(&wire)?;
    Ok(to_domain(wire))
}

fn validate_wire(wire: &PlanWire) -> Result<(), ValidationError> {
    if wire.groups.is_empty() {
        return Err(ValidationError("plan has no groups".into()));
    }
    let mut seen_ids = std::collections::HashSet::new();
    for (gi, group) in wire.groups.iter().enumerate() {
        if group.tasks.is_empty() {
            return Err(ValidationError(format!("group {gi} has no tasks")));
        }
        for task in &group.tasks {
            if !seen_ids.insert(task.task_id.clone()) {
                return Err(ValidationError(format!(
                    "duplicate task id: {}",
                    task.task_id
                )));
            }
            if TaskKind::parse(&task.kind).is_none() {
                return Err(ValidationError(format!("unknown task kind: {}", task.kind)));
            }
            if let Some(reason) = invalid_input_path(&task.input) {
                return Err(ValidationError(format!(
                    "task {} has an invalid input: {reason}",
                    task.task_id
                )));
            }
        }
    }
    Ok(())
}

/// Rejects path traversal (`..`) and absolute paths (leading `/`, leading
/// `\`, or a drive-letter prefix like `C:`).
fn invalid_input_path(input: &str) -> Option<&'static str> {
    if input.contains("..") {
        return Some("contains path traversal (..)");
    }
    if input.starts_with('/') || input.starts_with('\\') {
        return Some("is an absolute path");
    }
    let bytes = input.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Some("has a drive-letter prefix");
    }
    None
}

/// Validates an already-materialized [`Plan`] (e.g. one supplied directly by
/// a client via `SubmitJob`, rather than produced from plan-JSON text).
/// `TaskKind` membership is guaranteed by the type system here, so this
/// checks everything else `validate_wire` checks: non-empty groups/tasks,
/// unique task ids, and safe `input` paths.
pub fn validate_domain(plan: &Plan) -> Result<(), ValidationError> {
    if plan.groups.is_empty() {
        return Err(ValidationError("plan has no groups".into()));
    }
    let mut seen_ids = std::collections::HashSet::new();
    for (gi, group) in plan.groups.iter().enumerate() {
        if group.tasks.is_empty() {
            return Err(ValidationError(format!("group {gi} has no tasks")));
        }
        for task in &group.tasks {
            if !seen_ids.insert(task.task_id.clone()) {
                return Err(ValidationError(format!(
                    "duplicate task id: {}",
                    task.task_id
                )));
            }
            if let Some(reason) = invalid_input_path(&task.input) {
                return Err(ValidationError(format!(
                    "task {} has an invalid input: {reason}",
                    task.task_id
                )));
            }
        }
    }
    Ok(())
}

fn to_domain(wire: PlanWire) -> (Plan, ReduceSpec) {
    let groups = wire
        .groups
        .into_iter()
        .map(|g| TaskGroup {
            tasks: g
                .tasks
                .into_iter()
                .map(|t| TaskSpec {
                    task_id: t.task_id,
                    kind: TaskKind::parse(&t.kind).expect("validated above"),
                    input: t.input,
                    target_device_id: t.target_device_id,
                    prompt_tokens: t.prompt_tokens,
                    max_output_tokens: t.max_output_tokens,
                })
                .collect(),
        })
        .collect();
    let reduce = match wire.reduce {
        Some(r) if r.kind.eq_ignore_ascii_case("concat") => ReduceSpec {
            kind: ReduceKind::Concat,
        },
        _ => ReduceSpec::default(),
    };
    (Plan { groups }, reduce)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{"groups":[{"index":0,"tasks":[{"task_id":"t1","kind":"SYSINFO","input":""}]}]}"#
    }

    #[test]
    fn code_fenced_json_parses_identically_to_unfenced() {
        let fenced = format!("```json\n{}\n```", valid_json());
        let (a, _) = parse_and_validate(valid_json()).unwrap();
        let (b, _) = parse_and_validate(&fenced).unwrap();
        assert_eq!(a.task_ids(), b.task_ids());
    }

    #[test]
    fn plain_triple_backtick_fence_without_json_label_is_tolerated() {
        let fenced = format!("```\n{}\n```", valid_json());
        assert!(parse_and_validate(&fenced).is_ok());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{"groups":[{"index":0,"tasks":[{"task_id":"t1","kind":"NOPE","input":""}]}]}"#;
        assert!(parse_and_validate(json).is_err());
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let json = r#"{"groups":[{"index":0,"tasks":[
            {"task_id":"t1","kind":"SYSINFO","input":""},
            {"task_id":"t1","kind":"ECHO","input":""}
        ]}]}"#;
        assert!(parse_and_validate(json).is_err());
    }

    #[test]
    fn path_traversal_in_input_is_rejected() {
        let json = r#"{"groups":[{"index":0,"tasks":[{"task_id":"t1","kind":"ECHO","input":"../etc/passwd"}]}]}"#;
        assert!(parse_and_validate(json).is_err());
    }

    #[test]
    fn absolute_path_in_input_is_rejected() {
        let json = r#"{"groups":[{"index":0,"tasks":[{"task_id":"t1","kind":"ECHO","input":"/etc/passwd"}]}]}"#;
        assert!(parse_and_validate(json).is_err());
    }

    #[test]
    fn empty_groups_is_rejected() {
        assert!(parse_and_validate(r#"{"groups":[]}"#).is_err());
    }

    #[test]
    fn empty_group_tasks_is_rejected() {
        let json = r#"{"groups":[{"index":0,"tasks":[]}]}"#;
        assert!(parse_and_validate(json).is_err());
    }

    #[test]
    fn validate_domain_catches_duplicate_ids_like_validate_wire_does() {
        let (mut plan, _) = parse_and_validate(valid_json()).unwrap();
        let dup = plan.groups[0].tasks[0].clone();
        plan.groups[0].tasks.push(dup);
        assert!(validate_domain(&plan).is_err());
    }

    #[test]
    fn validate_domain_accepts_a_well_formed_plan() {
        let (plan, _) = parse_and_validate(valid_json()).unwrap();
        assert!(validate_domain(&plan).is_ok());
    }
}
