//! The closed set of canonical node types, the alias table that normalizes
//! deprecated names to canonicals, and the per-type input/output schema
//! registry.
//!
//! The registry is closed by design: adding a node type is a code change in
//! this module, never a runtime escalation. See [`NodeType::canonicalize`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::GraphError;

/// One of the eleven canonical node types the Planner is constrained to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Llm,
    Knowledge,
    Http,
    File,
    Human,
    Conditional,
    Loop,
    Parallel,
    Transform,
    // Extended types (§3.3)
    Code,
    Container,
    Database,
    Notification,
    Audio,
    Subflow,
}

impl NodeType {
    /// All canonical and extended node types, in the order they appear in §3.3.
    pub const ALL: &'static [NodeType] = &[
        NodeType::Start,
        NodeType::End,
        NodeType::Llm,
        NodeType::Knowledge,
        NodeType::Http,
        NodeType::File,
        NodeType::Human,
        NodeType::Conditional,
        NodeType::Loop,
        NodeType::Parallel,
        NodeType::Transform,
        NodeType::Code,
        NodeType::Container,
        NodeType::Database,
        NodeType::Notification,
        NodeType::Audio,
        NodeType::Subflow,
    ];

    /// The wire tag used in serialized documents and Planner output.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Llm => "llm",
            NodeType::Knowledge => "knowledge",
            NodeType::Http => "http",
            NodeType::File => "file",
            NodeType::Human => "human",
            NodeType::Conditional => "conditional",
            NodeType::Loop => "loop",
            NodeType::Parallel => "parallel",
            NodeType::Transform => "transform",
            NodeType::Code => "code",
            NodeType::Container => "container",
            NodeType::Database => "database",
            NodeType::Notification => "notification",
            NodeType::Audio => "audio",
            NodeType::Subflow => "subflow",
        }
    }

    /// Resolve a raw type tag (from deserialization or Planner output) to a
    /// canonical [`NodeType`], applying the alias table first.
    ///
    /// Returns whether the input tag was a deprecated alias, so callers can
    /// record `was_deprecated` for observability without the stored node
    /// itself carrying anything but the canonical tag (§4.1).
    pub fn canonicalize(raw: &str) -> Result<(NodeType, bool), GraphError> {
        if let Some(canonical) = Self::from_tag(raw) {
            return Ok((canonical, false));
        }
        if let Some(aliased) = alias_table().get(raw) {
            tracing::debug!(raw, canonical = aliased.tag(), "resolved deprecated node type alias");
            return Ok((*aliased, true));
        }
        Err(GraphError::UnknownNodeType(raw.to_string()))
    }

    fn from_tag(tag: &str) -> Option<NodeType> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }

    /// Whether this node type performs an externally visible action and must
    /// pass through the Executor's side-effect gate (§4.3).
    ///
    /// `http`/`database`/`file` are side-effecting only for write-shaped
    /// configs; the static classification here covers the type, the
    /// Executor additionally inspects the node's config (method/mode) at
    /// dispatch time via [`crate::graph::Node::is_side_effecting`].
    pub fn is_potentially_side_effecting(&self) -> bool {
        matches!(
            self,
            NodeType::Http
                | NodeType::Database
                | NodeType::Notification
                | NodeType::File
                | NodeType::Code
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Deprecated/historical type names mapped to their canonical replacement.
///
/// This table is the single source of truth for what `canonicalize` accepts
/// besides the eleven/six live tags; it is intentionally small and explicit
/// rather than a fuzzy-matching heuristic.
fn alias_table() -> &'static HashMap<&'static str, NodeType> {
    use std::sync::OnceLock;
    static TABLE: OnceLock<HashMap<&'static str, NodeType>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("agent", NodeType::Llm),
            ("llm_call", NodeType::Llm),
            ("rag", NodeType::Knowledge),
            ("retrieval", NodeType::Knowledge),
            ("webhook", NodeType::Http),
            ("rest", NodeType::Http),
            ("branch", NodeType::Conditional),
            ("if", NodeType::Conditional),
            ("foreach", NodeType::Loop),
            ("map", NodeType::Parallel),
            ("fanout", NodeType::Parallel),
            ("script", NodeType::Code),
            ("function", NodeType::Code),
            ("docker", NodeType::Container),
            ("sql", NodeType::Database),
            ("alert", NodeType::Notification),
            ("tts", NodeType::Audio),
            ("stt", NodeType::Audio),
            ("nested_workflow", NodeType::Subflow),
        ])
    })
}

/// A single field of a node type's input or output schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub required: bool,
    pub json_type: &'static str,
    pub default: Option<serde_json::Value>,
}

/// The compiled input/output schema catalog for a [`NodeType`].
///
/// Built once per type from a small literal table (see
/// [`schema_for`]) and compiled into a [`jsonschema::JSONSchema`] so the
/// Graph Model's `validate_node` (§4.1) and the Planner's action-schema
/// enforcement (§4.2 step 3) share one validation code path.
pub struct TypeSchema {
    pub node_type: NodeType,
    pub input_fields: Vec<(&'static str, FieldSpec)>,
    compiled_input: jsonschema::JSONSchema,
}

impl TypeSchema {
    /// Validate a node's config object against this type's input schema.
    /// Returns every violation rather than stopping at the first, matching
    /// the patch-application contract of "either the whole patch yields a
    /// valid workflow or ... every violation" (§4.1).
    pub fn validate_config(&self, config: &serde_json::Value) -> Result<(), GraphError> {
        let result = self.compiled_input.validate(config);
        if let Err(errors) = result {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(GraphError::SchemaViolation {
                node_type: self.node_type,
                violations: messages,
            });
        }
        Ok(())
    }

    /// Fill in every field carrying a declared default that `config` omits,
    /// applied before validation so a caller can leave a defaulted field out
    /// entirely rather than repeat the literal from `fields_for`.
    pub fn apply_defaults(&self, config: &mut serde_json::Value) {
        let Some(object) = config.as_object_mut() else { return };
        for (name, spec) in &self.input_fields {
            if let Some(default) = &spec.default {
                object.entry(*name).or_insert_with(|| default.clone());
            }
        }
    }
}

/// Build (and cache) the [`TypeSchema`] for a node type.
pub fn schema_for(node_type: NodeType) -> &'static TypeSchema {
    use std::collections::HashMap as Map;
    use std::sync::OnceLock;
    static CACHE: OnceLock<Map<NodeType, TypeSchema>> = OnceLock::new();
    let cache = CACHE.get_or_init(build_all_schemas);
    cache
        .get(&node_type)
        .expect("every NodeType::ALL member has a compiled schema")
}

fn build_all_schemas() -> HashMap<NodeType, TypeSchema> {
    NodeType::ALL
        .iter()
        .map(|t| (*t, compile_schema(*t)))
        .collect()
}

/// The literal field table per type. Field lists are intentionally small:
/// the executor's node handlers are the source of truth for behavior, this
/// table exists purely to reject malformed configs early and deterministically.
fn fields_for(node_type: NodeType) -> Vec<(&'static str, FieldSpec)> {
    let field = |required: bool, json_type: &'static str| FieldSpec {
        required,
        json_type,
        default: None,
    };
    let field_default = |json_type: &'static str, default: serde_json::Value| FieldSpec {
        required: false,
        json_type,
        default: Some(default),
    };
    match node_type {
        NodeType::Start | NodeType::End => vec![],
        NodeType::Llm => vec![
            ("model", field(true, "string")),
            ("prompt", field(true, "string")),
            ("temperature", field_default("number", serde_json::json!(0.7))),
        ],
        NodeType::Knowledge => vec![
            ("query", field(true, "string")),
            ("scope", field(false, "string")),
            ("top_k", field_default("integer", serde_json::json!(5))),
        ],
        NodeType::Http => vec![
            ("method", field(true, "string")),
            ("url", field(true, "string")),
            ("headers", field(false, "object")),
            ("body", field(false, "object")),
        ],
        NodeType::File => vec![
            ("operation", field(true, "string")),
            ("path", field(true, "string")),
        ],
        NodeType::Human => vec![("prompt", field(true, "string"))],
        NodeType::Conditional => vec![("guard", field(true, "string"))],
        NodeType::Loop => vec![
            ("body", field(true, "object")),
            ("until", field(false, "string")),
            ("max_iterations", field_default("integer", serde_json::json!(10))),
        ],
        NodeType::Parallel => vec![("children", field(true, "array"))],
        NodeType::Transform => vec![("expression", field(true, "string"))],
        NodeType::Code => vec![
            ("language", field(true, "string")),
            ("source", field(true, "string")),
            ("sandboxed", field_default("boolean", serde_json::json!(false))),
        ],
        NodeType::Container => vec![("image", field(true, "string"))],
        NodeType::Database => vec![
            ("operation", field(true, "string")),
            ("statement", field(true, "string")),
        ],
        NodeType::Notification => vec![
            ("channel", field(true, "string")),
            ("message", field(true, "string")),
        ],
        NodeType::Audio => vec![("mode", field(true, "string"))],
        NodeType::Subflow => vec![("workflow_id", field(true, "string"))],
    }
}

fn compile_schema(node_type: NodeType) -> TypeSchema {
    let input_fields = fields_for(node_type);
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, spec) in &input_fields {
        let mut property = serde_json::json!({ "type": spec.json_type });
        if let Some(default) = &spec.default {
            property["default"] = default.clone();
        }
        properties.insert(name.to_string(), property);
        if spec.required {
            required.push(serde_json::Value::String(name.to_string()));
        }
    }
    let schema_doc = serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    let compiled = jsonschema::JSONSchema::compile(&schema_doc)
        .expect("literal per-type schema table must compile");
    TypeSchema {
        node_type,
        input_fields,
        compiled_input: compiled,
    }
}
