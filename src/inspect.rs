//! Read-only structure queries over a document tree.
//!
//! Page-builder documents keep top-level element nodes under `content` and
//! nested children under `elements`; a node carries its kind in `elType`,
//! its widget kind in `widgetType`, and an `id`. These queries back the
//! read-only analysis tool so the model can look before it patches.

use serde::Serialize;
use serde_json::Value;

use crate::pointer::escape;

/// A matched property or value, with the pointer path that reaches it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyHit {
    pub path: String,
    pub value: Value,
}

/// Summary of one element node in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementSummary {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "elType", skip_serializing_if = "Option::is_none")]
    pub el_type: Option<String>,
    /// Falls back to `elType` for container nodes without a widget kind.
    #[serde(rename = "widgetType", skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
}

/// An element node with its settings, as returned by type lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDetail {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "elType", skip_serializing_if = "Option::is_none")]
    pub el_type: Option<String>,
    #[serde(rename = "widgetType", skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    pub settings: Value,
}

/// Every occurrence of a property named `name`, anywhere in the tree.
#[must_use]
pub fn find_property(document: &Value, name: &str) -> Vec<PropertyHit> {
    let mut hits = Vec::new();
    walk_properties(document, &mut String::new(), name, &mut hits);
    hits
}

fn walk_properties(value: &Value, path: &mut String, name: &str, hits: &mut Vec<PropertyHit>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let len = path.len();
                path.push('/');
                path.push_str(&escape(key));
                if key == name {
                    hits.push(PropertyHit {
                        path: path.clone(),
                        value: child.clone(),
                    });
                }
                walk_properties(child, path, name, hits);
                path.truncate(len);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let len = path.len();
                path.push('/');
                path.push_str(&index.to_string());
                walk_properties(child, path, name, hits);
                path.truncate(len);
            }
        }
        _ => {}
    }
}

/// Every element node under `content`, in document order, nested children
/// included.
#[must_use]
pub fn list_widgets(document: &Value) -> Vec<ElementSummary> {
    let mut widgets = Vec::new();
    if let Some(content) = document.get("content").and_then(Value::as_array) {
        collect_summaries(content, "/content", &mut widgets);
    }
    widgets
}

fn collect_summaries(elements: &[Value], path: &str, out: &mut Vec<ElementSummary>) {
    for (index, element) in elements.iter().enumerate() {
        let element_path = format!("{path}/{index}");
        out.push(ElementSummary {
            path: element_path.clone(),
            id: string_field(element, "id"),
            el_type: string_field(element, "elType"),
            widget_type: string_field(element, "widgetType")
                .or_else(|| string_field(element, "elType")),
        });
        if let Some(children) = element.get("elements").and_then(Value::as_array) {
            collect_summaries(children, &format!("{element_path}/elements"), out);
        }
    }
}

/// Counts sections, columns, and widgets for a one-line overview.
#[must_use]
pub fn summarize_widgets(widgets: &[ElementSummary]) -> String {
    let count_of = |kind: &str| {
        widgets
            .iter()
            .filter(|widget| widget.el_type.as_deref() == Some(kind))
            .count()
    };
    format!(
        "Found {} total elements: {} sections, {} columns, {} widgets",
        widgets.len(),
        count_of("section"),
        count_of("column"),
        count_of("widget"),
    )
}

/// All element nodes whose `widgetType` or `elType` equals `widget_type`,
/// with their settings.
#[must_use]
pub fn widget_info(document: &Value, widget_type: &str) -> Vec<ElementDetail> {
    let mut matching = Vec::new();
    if let Some(content) = document.get("content").and_then(Value::as_array) {
        collect_details(content, "/content", widget_type, &mut matching);
    }
    matching
}

fn collect_details(elements: &[Value], path: &str, wanted: &str, out: &mut Vec<ElementDetail>) {
    for (index, element) in elements.iter().enumerate() {
        let element_path = format!("{path}/{index}");
        let widget_type = string_field(element, "widgetType");
        let el_type = string_field(element, "elType");
        if widget_type.as_deref() == Some(wanted) || el_type.as_deref() == Some(wanted) {
            out.push(ElementDetail {
                path: element_path.clone(),
                id: string_field(element, "id"),
                el_type,
                widget_type,
                settings: element.get("settings").cloned().unwrap_or(Value::Null),
            });
        }
        if let Some(children) = element.get("elements").and_then(Value::as_array) {
            collect_details(children, &format!("{element_path}/elements"), wanted, out);
        }
    }
}

/// Every string leaf containing `needle` (case-sensitive substring match).
#[must_use]
pub fn search_value(document: &Value, needle: &str) -> Vec<PropertyHit> {
    let mut hits = Vec::new();
    walk_values(document, &mut String::new(), needle, &mut hits);
    hits
}

fn walk_values(value: &Value, path: &mut String, needle: &str, hits: &mut Vec<PropertyHit>) {
    match value {
        Value::String(text) => {
            if text.contains(needle) {
                hits.push(PropertyHit {
                    path: path.clone(),
                    value: value.clone(),
                });
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let len = path.len();
                path.push('/');
                path.push_str(&escape(key));
                walk_values(child, path, needle, hits);
                path.truncate(len);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let len = path.len();
                path.push('/');
                path.push_str(&index.to_string());
                walk_values(child, path, needle, hits);
                path.truncate(len);
            }
        }
        _ => {}
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}
