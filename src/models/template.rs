// src/models/template.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One attribute of a data object the AI is defining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

impl ParsedField {
    pub fn new(name: impl Into<String>, field_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A data object whose JSON text was complete and parsed cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<ParsedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Vec<Map<String, Value>>>,
}

/// Best-effort interpretation of a streamed, possibly truncated, schema document.
///
/// Always derived from the whole buffer; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub objects: Vec<ParsedObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_object_name: Option<String>,
    pub current_fields: Vec<ParsedField>,
}

impl PartialSchema {
    /// True when nothing at all has been recovered yet.
    pub fn is_empty(&self) -> bool {
        self.template_name.is_none()
            && self.category.is_none()
            && self.objects.is_empty()
            && self.current_object_name.is_none()
            && self.current_fields.is_empty()
    }
}

/// Final schema payload delivered with a `template:result` event.
///
/// Object and relation bodies are kept as raw JSON so nothing the server
/// sends is lost on the way to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSchema {
    #[serde(default)]
    pub objects: Vec<Value>,
    #[serde(default)]
    pub relations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<HashMap<String, Vec<Value>>>,
}

impl TemplateSchema {
    pub fn object_names(&self) -> Vec<&str> {
        self.objects
            .iter()
            .filter_map(|o| o.get("name").and_then(|n| n.as_str()))
            .collect()
    }
}

/// Finalized template attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTemplatePreview {
    pub template_name: String,
    pub category: String,
    pub schema: TemplateSchema,
}
