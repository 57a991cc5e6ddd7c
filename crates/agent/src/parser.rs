//! Tool-call parser — pure text-to-structure transformation.
//!
//! A model turn carries tool calls either as native structured payloads or
//! embedded in free text. The free-text formats, in priority order:
//!
//! 1. Fenced blocks: ` ```json {"tool": "read_file", "path": "..."} ``` `
//! 2. Tagged blocks: `<tool>{"tool": ...}</tool>`
//! 3. Bare objects: `{"tool": ...}` located by brace balancing
//!
//! Model output is untrusted: a malformed candidate never aborts the turn.
//! It becomes a failing result referencing the offending call, so the
//! model sees the failure and can self-correct. The parser itself performs
//! no side effects.

use std::collections::HashSet;
use std::ops::Range;

use quill_core::backend::ModelTurn;
use quill_core::error::ToolError;
use quill_core::tool::{ToolCall, ToolRegistry, ToolResult};
use quill_core::turn::TurnToolCall;
use regex_lite::Regex;

/// One parsed element of a model turn, in emission order.
#[derive(Debug, Clone)]
pub enum ParsedItem {
    /// A validated call, ready for the executor.
    Call(ToolCall),
    /// A malformed or invalid call, already resolved to a failure.
    Invalid(ToolResult),
}

/// The parsed form of a model turn.
#[derive(Debug, Clone, Default)]
pub struct ParsedTurn {
    /// Calls and pre-failed results, in emission order
    pub items: Vec<ParsedItem>,

    /// Raw call records for the transcript (one per item, same order)
    pub raw_calls: Vec<TurnToolCall>,

    /// Residual plain-text content with extracted blocks removed
    pub text: String,
}

impl ParsedTurn {
    pub fn has_calls(&self) -> bool {
        !self.items.is_empty()
    }

    /// The validated calls only.
    pub fn calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.items.iter().filter_map(|item| match item {
            ParsedItem::Call(call) => Some(call),
            ParsedItem::Invalid(_) => None,
        })
    }

    pub fn first_call(&self) -> Option<&ToolCall> {
        self.calls().next()
    }
}

/// Parse a model turn against the registry's declared tools.
///
/// Native structured calls take priority; otherwise calls are extracted
/// from the text.
pub fn parse_model_turn(turn: &ModelTurn, registry: &ToolRegistry) -> ParsedTurn {
    if !turn.tool_calls.is_empty() {
        parse_native(&turn.tool_calls, &turn.text, registry)
    } else {
        parse_text(&turn.text, registry)
    }
}

fn parse_native(calls: &[TurnToolCall], text: &str, registry: &ToolRegistry) -> ParsedTurn {
    let mut parsed = ParsedTurn {
        text: text.to_string(),
        ..Default::default()
    };

    for (idx, tc) in calls.iter().enumerate() {
        let id = if tc.id.is_empty() {
            format!("call_{idx}")
        } else {
            tc.id.clone()
        };
        parsed.raw_calls.push(TurnToolCall {
            id: id.clone(),
            name: tc.name.clone(),
            arguments: tc.arguments.clone(),
        });

        let item = match serde_json::from_str::<serde_json::Value>(&tc.arguments) {
            Ok(args) => validate_call(id, &tc.name, args, registry),
            Err(e) => ParsedItem::Invalid(ToolResult::failure(
                id,
                ToolError::MalformedCall(format!("arguments are not valid JSON: {e}")),
            )),
        };
        parsed.items.push(item);
    }

    parsed
}

fn parse_text(text: &str, registry: &ToolRegistry) -> ParsedTurn {
    let mut parsed = ParsedTurn::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut removed: Vec<Range<usize>> = Vec::new();

    let fence_re = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
        .expect("fence pattern is valid");
    let tag_re =
        Regex::new(r"(?s)<tool>\s*(\{.*?\})\s*</tool>").expect("tag pattern is valid");

    for re in [&fence_re, &tag_re] {
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).expect("match 0 always present");
            let body = caps.get(1).expect("group 1 always present");
            consume_candidate(
                body.as_str(),
                whole.range(),
                registry,
                &mut parsed,
                &mut seen,
                &mut removed,
            );
        }
    }

    // Bare objects are only considered when the structured formats
    // produced nothing at all.
    if parsed.items.is_empty() {
        let bare_re = Regex::new(r#"\{\s*"tool"\s*:"#).expect("bare pattern is valid");
        for m in bare_re.find_iter(text) {
            let Some(candidate) = balanced_object(&text[m.start()..]) else {
                continue;
            };
            let range = m.start()..m.start() + candidate.len();
            consume_candidate(candidate, range, registry, &mut parsed, &mut seen, &mut removed);
        }
    }

    parsed.text = strip_ranges(text, &mut removed);
    parsed
}

/// Parse one candidate JSON source and append the outcome.
fn consume_candidate(
    source: &str,
    span: Range<usize>,
    registry: &ToolRegistry,
    parsed: &mut ParsedTurn,
    seen: &mut HashSet<String>,
    removed: &mut Vec<Range<usize>>,
) {
    match serde_json::from_str::<serde_json::Value>(source) {
        Ok(value) => {
            let Some(name) = value["tool"].as_str().map(String::from) else {
                // A JSON block without a "tool" field is ordinary content
                return;
            };
            removed.push(span);

            let mut arguments = value.clone();
            if let Some(obj) = arguments.as_object_mut() {
                obj.remove("tool");
            }

            // Identical tool + arguments collapse to one call
            let key = format!("{name}:{}", canonical_json(&arguments));
            if !seen.insert(key) {
                return;
            }

            let id = format!("call_{}", parsed.items.len());
            parsed.raw_calls.push(TurnToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.to_string(),
            });
            parsed
                .items
                .push(validate_call(id, &name, arguments, registry));
        }
        Err(e) => {
            // Only treat it as a broken call if it was clearly meant as one
            if source.contains("\"tool\"") {
                removed.push(span);
                let id = format!("call_{}", parsed.items.len());
                parsed.raw_calls.push(TurnToolCall {
                    id: id.clone(),
                    name: "invalid".into(),
                    arguments: source.to_string(),
                });
                parsed.items.push(ParsedItem::Invalid(ToolResult::failure(
                    id,
                    ToolError::MalformedCall(format!("not valid JSON: {e}")),
                )));
            }
        }
    }
}

/// Validate a call against the registry: known tool, object arguments,
/// required parameters present.
fn validate_call(
    id: String,
    name: &str,
    arguments: serde_json::Value,
    registry: &ToolRegistry,
) -> ParsedItem {
    let Some(tool) = registry.get(name) else {
        return ParsedItem::Invalid(ToolResult::failure(
            id,
            ToolError::UnknownTool(name.to_string()),
        ));
    };

    let Some(obj) = arguments.as_object() else {
        return ParsedItem::Invalid(ToolResult::failure(
            id,
            ToolError::InvalidArguments("arguments must be a JSON object".into()),
        ));
    };

    let definition = tool.to_definition();
    for param in definition.required_params() {
        if !obj.contains_key(param) {
            return ParsedItem::Invalid(ToolResult::failure(
                id,
                ToolError::InvalidArguments(format!(
                    "missing required parameter '{param}' for {name}"
                )),
            ));
        }
    }

    ParsedItem::Call(ToolCall {
        id,
        name: name.to_string(),
        arguments,
    })
}

/// Extract a brace-balanced JSON object prefix, respecting strings.
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// JSON with recursively sorted object keys, for dedup comparisons.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Remove the recorded spans from the text, collapsing leftover whitespace.
fn strip_ranges(text: &str, removed: &mut Vec<Range<usize>>) -> String {
    removed.sort_by_key(|r| r.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for range in removed.iter() {
        if range.start >= cursor {
            out.push_str(&text[cursor..range.start]);
            cursor = range.end;
        }
    }
    out.push_str(&text[cursor..]);
    out.trim().to_string()
}
