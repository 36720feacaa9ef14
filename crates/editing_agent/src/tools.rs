//! Tool registry and the built-in document tools.
//!
//! Handlers receive parsed JSON arguments plus a [`ToolContext`] carrying a
//! document snapshot, the approval gate, and a staging buffer for UI
//! events. The mutation tool proposes through the gate; nothing in this
//! module writes to a document directly.

use agent_provider::{ToolCallRequest, ToolDefinition, ToolResult};
use graft::{ApprovalGate, PatchSet, Snapshot};
use serde_json::{json, Value};

use crate::events::UiEvent;

pub const GENERATE_JSON_PATCH_TOOL: &str = "generate_json_patch";
pub const ANALYZE_JSON_STRUCTURE_TOOL: &str = "analyze_json_structure";

const ANALYZE_QUERY_TYPES: &str = "find_property, list_widgets, get_widget_info, search_value";

/// Execution context for one tool call.
pub struct ToolContext<'a> {
    /// Document as of call time.
    pub document: Snapshot,
    pub gate: &'a mut ApprovalGate,
    /// UI events staged by the handler; the turn loop forwards them to the
    /// host after the call returns.
    pub events: &'a mut Vec<UiEvent>,
}

/// Handler outcome, without call routing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultBody {
    pub is_error: bool,
    pub content: Value,
}

impl ToolResultBody {
    #[must_use]
    pub fn ok(content: Value) -> Self {
        Self {
            is_error: false,
            content,
        }
    }

    /// Error result with the standard `{"error": ...}` envelope.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::fail_with(json!({ "error": message.into() }))
    }

    #[must_use]
    pub fn fail_with(content: Value) -> Self {
        Self {
            is_error: true,
            content,
        }
    }
}

pub trait ToolHandler: Send {
    fn call(&mut self, arguments: &Value, ctx: &mut ToolContext<'_>) -> ToolResultBody;
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Box<dyn ToolHandler>,
}

/// Ordered tool set advertised to the model on every round-trip.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the built-in document tools.
    #[must_use]
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(
            generate_json_patch_definition(),
            Box::new(GenerateJsonPatchTool),
        );
        registry.register(
            analyze_json_structure_definition(),
            Box::new(AnalyzeJsonStructureTool),
        );
        registry
    }

    /// Registers a tool. A tool with the same name is replaced in place so
    /// the advertised order stays stable.
    pub fn register(&mut self, definition: ToolDefinition, handler: Box<dyn ToolHandler>) {
        if let Some(existing) = self
            .tools
            .iter_mut()
            .find(|tool| tool.definition.name == definition.name)
        {
            existing.definition = definition;
            existing.handler = handler;
            return;
        }
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| tool.definition.clone())
            .collect()
    }

    /// Routes one call to its handler. Unknown tool names come back as an
    /// error result for the model to read, never as a loop failure.
    pub fn execute(&mut self, call: &ToolCallRequest, ctx: &mut ToolContext<'_>) -> ToolResult {
        let Some(tool) = self
            .tools
            .iter_mut()
            .find(|tool| tool.definition.name == call.tool_name)
        else {
            return ToolResult::error(
                call.call_id.clone(),
                call.tool_name.clone(),
                json!({ "error": format!("Unknown tool: {}", call.tool_name) }),
            );
        };

        let body = tool.handler.call(&call.arguments, ctx);
        ToolResult {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            is_error: body.is_error,
            content: body.content,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}

fn generate_json_patch_definition() -> ToolDefinition {
    ToolDefinition {
        name: GENERATE_JSON_PATCH_TOOL.to_string(),
        description: Some(
            "Propose an ordered set of JSON patch operations for user approval. \
             Proposed patches are validated and queued; they are never applied directly."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "patches": {
                    "type": "array",
                    "description": "Patch operations applied in order once approved.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "op": { "type": "string", "enum": ["replace", "add", "remove"] },
                            "path": { "type": "string", "description": "JSON Pointer to the target location." },
                            "value": { "description": "New value; required for replace and add." }
                        },
                        "required": ["op", "path"]
                    }
                },
                "summary": {
                    "type": "string",
                    "description": "One-line description shown in the approval prompt."
                }
            },
            "required": ["patches", "summary"]
        }),
    }
}

fn analyze_json_structure_definition() -> ToolDefinition {
    ToolDefinition {
        name: ANALYZE_JSON_STRUCTURE_TOOL.to_string(),
        description: Some(
            "Inspect the current document: find properties by name, list widgets, \
             fetch widget details, or search string values."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query_type": {
                    "type": "string",
                    "enum": ["find_property", "list_widgets", "get_widget_info", "search_value"]
                },
                "target": {
                    "type": "string",
                    "description": "Property name, widget type, or search text, depending on query_type."
                }
            },
            "required": ["query_type"]
        }),
    }
}

struct GenerateJsonPatchTool;

impl ToolHandler for GenerateJsonPatchTool {
    fn call(&mut self, arguments: &Value, ctx: &mut ToolContext<'_>) -> ToolResultBody {
        let Some(object) = arguments.as_object() else {
            return ToolResultBody::fail("generate_json_patch arguments must be a JSON object");
        };

        let Some(patches) = object.get("patches") else {
            return ToolResultBody::fail("generate_json_patch requires a `patches` array");
        };
        if !patches.is_array() {
            return ToolResultBody::fail("`patches` must be an array of patch operations");
        }

        let summary = match object.get("summary") {
            Some(Value::String(summary)) => summary.clone(),
            Some(_) => {
                return ToolResultBody::fail("`summary` must be a string describing the change")
            }
            None => return ToolResultBody::fail("generate_json_patch requires a `summary` string"),
        };

        let patch: PatchSet = match serde_json::from_value(arguments.clone()) {
            Ok(patch) => patch,
            Err(error) => {
                return ToolResultBody::fail(format!("invalid patch operations: {error}"));
            }
        };

        let operation_count = patch.len();
        match ctx.gate.propose(patch) {
            Ok(approval_id) => {
                ctx.events.push(UiEvent::PendingApprovalCreated {
                    approval_id,
                    summary: summary.clone(),
                });
                ToolResultBody::ok(json!({
                    "status": "pending_approval",
                    "approval_id": approval_id.to_string(),
                    "summary": summary,
                    "operation_count": operation_count,
                }))
            }
            Err(errors) => ToolResultBody::fail_with(json!({
                "error": "patch validation failed",
                "validation_errors": errors
                    .iter()
                    .map(|error| json!({
                        "index": error.index,
                        "message": error.error.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            })),
        }
    }
}

struct AnalyzeJsonStructureTool;

impl ToolHandler for AnalyzeJsonStructureTool {
    fn call(&mut self, arguments: &Value, ctx: &mut ToolContext<'_>) -> ToolResultBody {
        let Some(object) = arguments.as_object() else {
            return ToolResultBody::fail("analyze_json_structure arguments must be a JSON object");
        };

        let Some(query_type) = object.get("query_type").and_then(Value::as_str) else {
            return ToolResultBody::fail(format!(
                "`query_type` is required and must be one of: {ANALYZE_QUERY_TYPES}"
            ));
        };

        let target = object.get("target").and_then(Value::as_str);
        let document = ctx.document.as_ref();

        match query_type {
            "find_property" => {
                let Some(target) = target else {
                    return missing_target(query_type);
                };
                let matches = graft::find_property(document, target);
                ToolResultBody::ok(json!({
                    "query_type": "find_property",
                    "target": target,
                    "count": matches.len(),
                    "matches": matches,
                }))
            }
            "list_widgets" => {
                let widgets = graft::list_widgets(document);
                ToolResultBody::ok(json!({
                    "query_type": "list_widgets",
                    "summary": graft::summarize_widgets(&widgets),
                    "count": widgets.len(),
                    "widgets": widgets,
                }))
            }
            "get_widget_info" => {
                let Some(target) = target else {
                    return missing_target(query_type);
                };
                let widgets = graft::widget_info(document, target);
                ToolResultBody::ok(json!({
                    "query_type": "get_widget_info",
                    "target": target,
                    "count": widgets.len(),
                    "widgets": widgets,
                }))
            }
            "search_value" => {
                let Some(target) = target else {
                    return missing_target(query_type);
                };
                let matches = graft::search_value(document, target);
                ToolResultBody::ok(json!({
                    "query_type": "search_value",
                    "target": target,
                    "count": matches.len(),
                    "matches": matches,
                }))
            }
            unknown => ToolResultBody::fail(format!(
                "unknown query_type '{unknown}'; valid values: {ANALYZE_QUERY_TYPES}"
            )),
        }
    }
}

fn missing_target(query_type: &str) -> ToolResultBody {
    ToolResultBody::fail(format!(
        "`target` is required for query_type '{query_type}'"
    ))
}
