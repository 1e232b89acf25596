//! Schema descriptors for structured output.
//!
//! A [`SchemaDescriptor`] wraps a JSON Schema document as produced by a domain
//! model (with `$defs`/`$ref` indirection, titles, defaults and
//! `additionalProperties`). [`SchemaDescriptor::compile`] turns it into a
//! [`CompiledSchema`]: the provider-facing wire schema plus a [`SchemaNode`]
//! tree used for validation and repair.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Keys the provider rejects or does not need in a response schema.
const STRIPPED_KEYS: &[&str] = &[
    "$defs",
    "definitions",
    "$schema",
    "additionalProperties",
    "title",
    "default",
];

/// Nesting depth after which `$ref` resolution is considered recursive.
const MAX_REF_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema `{schema}` references unknown definition `{reference}`")]
    UnresolvedReference { schema: String, reference: String },

    #[error("schema `{schema}` contains a recursive reference deeper than {MAX_REF_DEPTH} levels")]
    RecursiveReference { schema: String },
}

/// An opaque structured-output schema, identified by name.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: &'static str,
    raw: Value,
}

/// Wire schema and validation tree derived from one [`SchemaDescriptor`].
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub name: &'static str,
    pub wire: Value,
    pub root: SchemaNode,
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object {
        properties: BTreeMap<String, SchemaNode>,
        required: Vec<String>,
        /// `additionalProperties: false` in the source schema.
        closed: bool,
    },
    Array {
        items: Box<SchemaNode>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        allowed: Option<Vec<String>>,
    },
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Boolean,
    Any,
}

/// A single validation failure, located by a JSON path such as `$.turns[2].message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl SchemaDescriptor {
    pub fn new(name: &'static str, raw: Value) -> Self {
        Self { name, raw }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Resolve every `$ref` against the document's `$defs` and drop the definitions table.
    pub fn inline_refs(&self) -> Result<Value, SchemaError> {
        let definitions = self
            .raw
            .get("$defs")
            .or_else(|| self.raw.get("definitions"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut inlined = self.resolve(&self.raw, &definitions, 0)?;
        if let Value::Object(map) = &mut inlined {
            map.remove("$defs");
            map.remove("definitions");
        }
        Ok(inlined)
    }

    /// Build the provider-compatible schema: refs inlined, rejected keywords stripped.
    ///
    /// Property names are never treated as keywords, so a field called `title`
    /// or `default` survives.
    pub fn wire_schema(&self) -> Result<Value, SchemaError> {
        Ok(strip_unsupported(&self.inline_refs()?))
    }

    pub fn compile(&self) -> Result<CompiledSchema, SchemaError> {
        let inlined = self.inline_refs()?;
        Ok(CompiledSchema {
            name: self.name,
            wire: strip_unsupported(&inlined),
            root: SchemaNode::parse(&inlined),
        })
    }

    fn resolve(
        &self,
        node: &Value,
        definitions: &Map<String, Value>,
        depth: usize,
    ) -> Result<Value, SchemaError> {
        if depth > MAX_REF_DEPTH {
            return Err(SchemaError::RecursiveReference {
                schema: self.name.to_string(),
            });
        }
        match node {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, definitions, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let target = reference.rsplit('/').next().unwrap_or_default();
                    let mut merged = definitions
                        .get(target)
                        .and_then(Value::as_object)
                        .cloned()
                        .ok_or_else(|| SchemaError::UnresolvedReference {
                            schema: self.name.to_string(),
                            reference: reference.clone(),
                        })?;
                    for (key, value) in map {
                        if key != "$ref" {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    return self.resolve(&Value::Object(merged), definitions, depth + 1);
                }
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    if key == "$defs" || key == "definitions" {
                        continue;
                    }
                    resolved.insert(key.clone(), self.resolve(value, definitions, depth)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }
}

fn strip_unsupported(node: &Value) -> Value {
    match node {
        Value::Array(items) => Value::Array(items.iter().map(strip_unsupported).collect()),
        Value::Object(map) => {
            let mut stripped = Map::with_capacity(map.len());
            for (key, value) in map {
                if STRIPPED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let value = match (key.as_str(), value) {
                    ("properties", Value::Object(properties)) => Value::Object(
                        properties
                            .iter()
                            .map(|(name, schema)| (name.clone(), strip_unsupported(schema)))
                            .collect(),
                    ),
                    _ => strip_unsupported(value),
                };
                stripped.insert(key.clone(), value);
            }
            Value::Object(stripped)
        }
        other => other.clone(),
    }
}

fn as_usize(node: &Map<String, Value>, key: &str) -> Option<usize> {
    node.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

impl SchemaNode {
    /// Parse a ref-free JSON Schema node. Unknown shapes become [`SchemaNode::Any`].
    pub fn parse(node: &Value) -> SchemaNode {
        let Some(map) = node.as_object() else {
            return SchemaNode::Any;
        };

        let allowed: Option<Vec<String>> = map.get("enum").and_then(Value::as_array).and_then(|values| {
            values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect()
        });

        let declared = map.get("type").and_then(Value::as_str);
        let kind = declared.or_else(|| allowed.as_ref().map(|_| "string"));

        match kind {
            Some("object") => {
                let properties = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, schema)| (name.clone(), SchemaNode::parse(schema)))
                            .collect()
                    })
                    .unwrap_or_default();
                let required = map
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|n| n.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let closed = matches!(map.get("additionalProperties"), Some(Value::Bool(false)));
                SchemaNode::Object {
                    properties,
                    required,
                    closed,
                }
            }
            Some("array") => SchemaNode::Array {
                items: Box::new(map.get("items").map(SchemaNode::parse).unwrap_or(SchemaNode::Any)),
                min_items: as_usize(map, "minItems"),
                max_items: as_usize(map, "maxItems"),
            },
            Some("string") => SchemaNode::String {
                min_length: as_usize(map, "minLength"),
                max_length: as_usize(map, "maxLength"),
                allowed,
            },
            Some("integer") => SchemaNode::Integer {
                minimum: map.get("minimum").and_then(Value::as_i64),
                maximum: map.get("maximum").and_then(Value::as_i64),
            },
            Some("number") => SchemaNode::Number {
                minimum: map.get("minimum").and_then(Value::as_f64),
                maximum: map.get("maximum").and_then(Value::as_f64),
            },
            Some("boolean") => SchemaNode::Boolean,
            _ => SchemaNode::Any,
        }
    }

    /// Check `value` against this node, returning every violation found.
    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check(value, "$", &mut violations);
        violations
    }

    fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        let mut fail = |message: String| {
            out.push(Violation {
                path: path.to_string(),
                message,
            })
        };

        match self {
            SchemaNode::Object {
                properties,
                required,
                closed,
            } => {
                let Some(map) = value.as_object() else {
                    fail(format!("expected object, got {}", kind_of(value)));
                    return;
                };
                for name in required {
                    if !map.contains_key(name) {
                        out.push(Violation {
                            path: format!("{path}.{name}"),
                            message: "missing required field".to_string(),
                        });
                    }
                }
                for (name, field) in map {
                    match properties.get(name) {
                        Some(node) => node.check(field, &format!("{path}.{name}"), out),
                        None if *closed => out.push(Violation {
                            path: format!("{path}.{name}"),
                            message: "unexpected field".to_string(),
                        }),
                        None => {}
                    }
                }
            }
            SchemaNode::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(elements) = value.as_array() else {
                    fail(format!("expected array, got {}", kind_of(value)));
                    return;
                };
                if let Some(min) = min_items
                    && elements.len() < *min
                {
                    fail(format!("expected at least {min} items, got {}", elements.len()));
                }
                if let Some(max) = max_items
                    && elements.len() > *max
                {
                    fail(format!("expected at most {max} items, got {}", elements.len()));
                }
                for (index, element) in elements.iter().enumerate() {
                    items.check(element, &format!("{path}[{index}]"), out);
                }
            }
            SchemaNode::String {
                min_length,
                max_length,
                allowed,
            } => {
                let Some(text) = value.as_str() else {
                    fail(format!("expected string, got {}", kind_of(value)));
                    return;
                };
                let length = text.chars().count();
                if let Some(min) = min_length
                    && length < *min
                {
                    fail(format!("expected at least {min} characters, got {length}"));
                }
                if let Some(max) = max_length
                    && length > *max
                {
                    fail(format!("expected at most {max} characters, got {length}"));
                }
                if let Some(allowed) = allowed
                    && !allowed.iter().any(|candidate| candidate == text)
                {
                    fail(format!("`{text}` is not one of [{}]", allowed.join(", ")));
                }
            }
            SchemaNode::Integer { minimum, maximum } => {
                let Some(number) = value.as_i64() else {
                    fail(format!("expected integer, got {}", kind_of(value)));
                    return;
                };
                if let Some(min) = minimum
                    && number < *min
                {
                    fail(format!("{number} is below the minimum of {min}"));
                }
                if let Some(max) = maximum
                    && number > *max
                {
                    fail(format!("{number} is above the maximum of {max}"));
                }
            }
            SchemaNode::Number { minimum, maximum } => {
                let Some(number) = value.as_f64() else {
                    fail(format!("expected number, got {}", kind_of(value)));
                    return;
                };
                if let Some(min) = minimum
                    && number < *min
                {
                    fail(format!("{number} is below the minimum of {min}"));
                }
                if let Some(max) = maximum
                    && number > *max
                {
                    fail(format!("{number} is above the maximum of {max}"));
                }
            }
            SchemaNode::Boolean => {
                if !value.is_boolean() {
                    fail(format!("expected boolean, got {}", kind_of(value)));
                }
            }
            SchemaNode::Any => {}
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft_like() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "Draft",
            json!({
                "$defs": {
                    "Role": {"enum": ["customer", "agent"], "title": "Role", "type": "string"},
                    "Turn": {
                        "additionalProperties": false,
                        "properties": {
                            "role": {"$ref": "#/$defs/Role"},
                            "message": {"maxLength": 10, "minLength": 1, "title": "Message", "type": "string"}
                        },
                        "required": ["role", "message"],
                        "title": "Turn",
                        "type": "object"
                    }
                },
                "additionalProperties": false,
                "properties": {
                    "title": {"maxLength": 12, "minLength": 3, "title": "Title", "type": "string"},
                    "turns": {"items": {"$ref": "#/$defs/Turn"}, "maxItems": 3, "minItems": 1, "type": "array"},
                    "score": {"default": 1, "maximum": 5, "minimum": 1, "type": "integer"}
                },
                "required": ["title", "turns"],
                "title": "Draft",
                "type": "object"
            }),
        )
    }

    #[test]
    fn wire_schema_inlines_refs_and_strips_rejected_keywords() {
        let wire = draft_like().wire_schema().unwrap();
        let text = serde_json::to_string(&wire).unwrap();

        assert!(wire.get("$defs").is_none());
        assert!(!text.contains("$ref"));
        assert!(!text.contains("additionalProperties"));
        assert!(!text.contains("\"default\""));
        assert_eq!(wire["type"], "object");
        assert_eq!(wire["properties"]["turns"]["items"]["properties"]["role"]["enum"], json!(["customer", "agent"]));
    }

    #[test]
    fn wire_schema_keeps_property_named_title() {
        let wire = draft_like().wire_schema().unwrap();
        assert!(wire["properties"].get("title").is_some());
        assert!(wire["properties"]["title"].get("title").is_none());
        assert!(wire.get("title").is_none());
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let schema = SchemaDescriptor::new("Broken", json!({"type": "object", "properties": {"x": {"$ref": "#/$defs/Missing"}}}));
        assert!(matches!(
            schema.wire_schema(),
            Err(SchemaError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn recursive_reference_is_bounded() {
        let schema = SchemaDescriptor::new(
            "Tree",
            json!({
                "$defs": {"Node": {"type": "object", "properties": {"child": {"$ref": "#/$defs/Node"}}}},
                "$ref": "#/$defs/Node"
            }),
        );
        assert!(matches!(
            schema.compile(),
            Err(SchemaError::RecursiveReference { .. })
        ));
    }

    #[test]
    fn tree_keeps_closed_objects_and_enums() {
        let compiled = draft_like().compile().unwrap();
        let SchemaNode::Object { properties, closed, .. } = &compiled.root else {
            panic!("expected object root");
        };
        assert!(*closed);
        let SchemaNode::Array { items, max_items, .. } = &properties["turns"] else {
            panic!("expected array");
        };
        assert_eq!(*max_items, Some(3));
        let SchemaNode::Object { properties: turn, .. } = items.as_ref() else {
            panic!("expected object items");
        };
        assert_eq!(
            turn["role"],
            SchemaNode::String {
                min_length: None,
                max_length: None,
                allowed: Some(vec!["customer".into(), "agent".into()]),
            }
        );
    }

    #[test]
    fn validate_reports_paths_of_each_violation() {
        let compiled = draft_like().compile().unwrap();
        let payload = json!({
            "title": "ok title",
            "turns": [
                {"role": "customer", "message": "far too long message"},
                {"role": "robot", "message": "hi"}
            ],
            "score": 9,
            "extra": true
        });

        let violations = compiled.root.validate(&payload);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();

        assert!(paths.contains(&"$.turns[0].message"));
        assert!(paths.contains(&"$.turns[1].role"));
        assert!(paths.contains(&"$.score"));
        assert!(paths.contains(&"$.extra"));
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn validate_counts_characters_not_bytes() {
        let node = SchemaNode::String {
            min_length: None,
            max_length: Some(4),
            allowed: None,
        };
        assert!(node.validate(&json!("дякую")).len() == 1);
        assert!(node.validate(&json!("дяку")).is_empty());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let compiled = draft_like().compile().unwrap();
        let violations = compiled.root.validate(&json!({"title": "a title"}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.turns");
    }
}
