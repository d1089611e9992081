// ABOUTME: Declarative tool-definition DSL for exposing callable capabilities to a language model.
// ABOUTME: Compiles typed parameter trees to JSON Schema, reverse-compiles discovered schemas, and binds handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Name of the placeholder property synthesized when a discovered schema
/// has a correctly-typed but empty properties object. Downstream
/// consumers that require at least one parameter must not fail on an
/// empty schema.
pub const PLACEHOLDER_PARAM: &str = "_noop";

const PLACEHOLDER_DESCRIPTION: &str = "Unused placeholder parameter. Always pass an empty string.";

/// Errors raised while building or executing tool definitions.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Handler(String),
}

/// The JSON Schema type of one tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }

    fn from_str(s: &str) -> Result<Self, ToolError> {
        match s {
            "string" => Ok(ParamKind::String),
            "integer" => Ok(ParamKind::Integer),
            "number" => Ok(ParamKind::Number),
            "boolean" => Ok(ParamKind::Boolean),
            "object" => Ok(ParamKind::Object),
            "array" => Ok(ParamKind::Array),
            other => Err(ToolError::InvalidSchema(format!(
                "unsupported parameter type: {other}"
            ))),
        }
    }
}

/// One node in a tool's parameter tree. Object nodes carry children;
/// array nodes carry exactly one items node.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub enum_values: Option<Vec<Value>>,
    pub children: Vec<ToolParam>,
    pub items: Option<Box<ToolParam>>,
}

impl ToolParam {
    fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            enum_values: None,
            children: Vec::new(),
            items: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Object, description)
    }

    pub fn array(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Array, description)
    }

    /// Mark this parameter as required at its nesting level.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Constrain this parameter to an enumerated set of values.
    pub fn enum_values(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Add a child property. Only meaningful for object nodes.
    pub fn child(mut self, param: ToolParam) -> Self {
        self.children.push(param);
        self
    }

    /// Declare the items node. Only meaningful for array nodes.
    pub fn items(mut self, param: ToolParam) -> Self {
        self.items = Some(Box::new(param));
        self
    }
}

/// Compile a parameter tree into a JSON-Schema-shaped object. A tree
/// with no declared parameters yields no schema at all: the function is
/// schema-less and takes no arguments.
pub fn compile_schema(params: &[ToolParam]) -> Option<Value> {
    if params.is_empty() {
        return None;
    }
    Some(compile_level(params))
}

fn compile_level(params: &[ToolParam]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        properties.insert(param.name.clone(), compile_node(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

fn compile_node(param: &ToolParam) -> Value {
    let mut node = Map::new();
    node.insert("type".to_string(), json!(param.kind.as_str()));
    if !param.description.is_empty() {
        node.insert("description".to_string(), json!(param.description));
    }
    if let Some(values) = &param.enum_values {
        node.insert("enum".to_string(), json!(values));
    }

    match param.kind {
        ParamKind::Object => {
            let level = compile_level(&param.children);
            node.insert("properties".to_string(), level["properties"].clone());
            node.insert("required".to_string(), level["required"].clone());
        }
        ParamKind::Array => {
            if let Some(items) = &param.items {
                node.insert("items".to_string(), compile_node(items));
            }
        }
        _ => {}
    }

    Value::Object(node)
}

/// Reconstruct a parameter tree from an externally supplied JSON Schema
/// document. This is how capability sets discovered at runtime are
/// normalized into the same representation as in-source declarations.
///
/// A schema with a correctly-typed but empty properties object gets a
/// single synthesized placeholder property.
pub fn params_from_schema(schema: &Value) -> Result<Vec<ToolParam>, ToolError> {
    let object = schema
        .as_object()
        .ok_or_else(|| ToolError::InvalidSchema("schema is not an object".to_string()))?;

    if object.get("type").and_then(Value::as_str) != Some("object") {
        return Err(ToolError::InvalidSchema(
            "schema root must have type 'object'".to_string(),
        ));
    }

    let properties = match object.get("properties") {
        Some(Value::Object(props)) => props,
        Some(_) => {
            return Err(ToolError::InvalidSchema(
                "properties must be an object".to_string(),
            ));
        }
        None => {
            return Err(ToolError::InvalidSchema(
                "schema is missing properties".to_string(),
            ));
        }
    };

    if properties.is_empty() {
        return Ok(vec![ToolParam::string(
            PLACEHOLDER_PARAM,
            PLACEHOLDER_DESCRIPTION,
        )]);
    }

    let required: Vec<&str> = object
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut params = Vec::with_capacity(properties.len());
    for (name, node) in properties {
        let mut param = param_from_node(name, node)?;
        param.required = required.contains(&name.as_str());
        params.push(param);
    }
    Ok(params)
}

fn param_from_node(name: &str, node: &Value) -> Result<ToolParam, ToolError> {
    let kind_str = node
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidSchema(format!("property '{name}' has no type")))?;
    let kind = ParamKind::from_str(kind_str)?;

    let description = node
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut param = ToolParam::new(name, kind, description);

    if let Some(values) = node.get("enum").and_then(Value::as_array) {
        param.enum_values = Some(values.clone());
    }

    match kind {
        ParamKind::Object => {
            // Nested objects reuse the top-level walk; an empty nested
            // properties object is preserved as a childless node rather
            // than getting a placeholder.
            if let Some(Value::Object(props)) = node.get("properties") {
                let required: Vec<&str> = node
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                for (child_name, child_node) in props {
                    let mut child = param_from_node(child_name, child_node)?;
                    child.required = required.contains(&child_name.as_str());
                    param.children.push(child);
                }
            }
        }
        ParamKind::Array => {
            let items = node.get("items").ok_or_else(|| {
                ToolError::InvalidSchema(format!("array property '{name}' has no items"))
            })?;
            param.items = Some(Box::new(param_from_node("items", items)?));
        }
        _ => {}
    }

    Ok(param)
}

type ToolHandler = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

/// A callable, schema-described tool. Immutable once built; many tool
/// definitions may belong to one [`ToolSet`].
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub schema: Option<Value>,
    handler: ToolHandler,
}

impl fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ToolDef {
    /// Start declaring a tool.
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ToolDefBuilder {
        ToolDefBuilder {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Dispatch a call to the bound handler with the supplied arguments.
    pub fn execute(&self, args: Value) -> Result<Value, ToolError> {
        (self.handler)(args)
    }
}

/// Builder recording the declarative property grammar for one tool.
pub struct ToolDefBuilder {
    name: String,
    description: String,
    params: Vec<ToolParam>,
}

impl ToolDefBuilder {
    /// Declare one parameter node.
    pub fn param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// Replace the declared parameters with a tree reverse-compiled from
    /// an external JSON Schema document.
    pub fn params_from_schema(mut self, schema: &Value) -> Result<Self, ToolError> {
        self.params = params_from_schema(schema)?;
        Ok(self)
    }

    /// Compile the schema and bind the handler, producing the immutable
    /// tool value object.
    pub fn build<F>(self, handler: F) -> ToolDef
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        ToolDef {
            name: self.name,
            description: self.description,
            schema: compile_schema(&self.params),
            handler: Arc::new(handler),
        }
    }
}

/// A named grouping of tool definitions: an ordered list for session
/// registration plus a name-keyed registry for dispatch.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    name: String,
    tools: Vec<ToolDef>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a tool. Re-adding a name replaces the previous definition in
    /// place, preserving its position in the ordered list.
    pub fn add(&mut self, def: ToolDef) {
        match self.index.get(&def.name) {
            Some(&pos) => self.tools[pos] = def,
            None => {
                self.index.insert(def.name.clone(), self.tools.len());
                self.tools.push(def);
            }
        }
    }

    /// Chained form of [`add`](Self::add).
    pub fn with(mut self, def: ToolDef) -> Self {
        self.add(def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDef> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name. Unknown names are an error; handler
    /// errors pass through unchanged.
    pub fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let def = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        def.execute(args)
    }

    /// Provider-agnostic definitions suitable for registration with a
    /// chat session: `{name, description, parameters}` records.
    pub fn definitions_json(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.schema.clone().unwrap_or(json!({
                        "type": "object",
                        "properties": {},
                        "required": [],
                    })),
                })
            })
            .collect()
    }

    /// Legacy flat-list format expressing every function as a
    /// `{type: "function", function: {...}}` record, with names prefixed
    /// by the normalized set name to avoid collisions across groupings.
    pub fn flat_function_list(&self) -> Vec<Value> {
        let prefix = normalize_set_name(&self.name);
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": format!("{prefix}__{}", tool.name),
                        "description": tool.description,
                        "parameters": tool.schema.clone().unwrap_or(json!({
                            "type": "object",
                            "properties": {},
                            "required": [],
                        })),
                    }
                })
            })
            .collect()
    }
}

/// Lower-case a set name and replace every non-alphanumeric run with a
/// single underscore, so generated function names stay collision-safe
/// and wire-legal.
pub fn normalize_set_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
