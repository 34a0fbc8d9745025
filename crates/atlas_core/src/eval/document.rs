use std::collections::HashMap;
use std::sync::Arc;

use atlas_db::MemDir;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::expr::{self, Reference, Scope, Step, kind};
use crate::cloud::CloudConfig;
use crate::context::EvalContext;
use crate::error::{CoreError, Result};
use crate::registry::DataSourceRegistry;

/// Declared type of an input variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Number,
    Bool,
    #[default]
    Any,
}

/// A `[variable.<name>]` declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable {
    #[serde(default, rename = "type")]
    pub ty: VarType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Variable {
    /// Check an input against the declared type. Text inputs, as given on the
    /// command line, are parsed into numbers and booleans.
    fn coerce(&self, name: &str, value: Value) -> Result<Value> {
        let mismatch = |value: &Value| CoreError::VariableType {
            name: name.to_string(),
            expected: format!("{:?}", self.ty).to_lowercase(),
            got: kind(value).to_string(),
        };
        match (self.ty, value) {
            (VarType::Any, value) => Ok(value),
            (VarType::String, value @ Value::String(_)) => Ok(value),
            (VarType::Number, value @ Value::Number(_)) => Ok(value),
            (VarType::Bool, value @ Value::Bool(_)) => Ok(value),
            (VarType::Number, Value::String(s)) => serde_json::from_str::<serde_json::Number>(s.trim())
                .map(Value::Number)
                .map_err(|_| mismatch(&Value::String(s))),
            (VarType::Bool, Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&Value::String(s))),
            },
            (_, other) => Err(mismatch(&other)),
        }
    }
}

/// A `[data.<type>.<label>]` block.
#[derive(Debug, Clone)]
pub struct DataBlock {
    pub type_name: String,
    pub label: String,
    pub attrs: Value,
}

impl DataBlock {
    pub fn path(&self) -> String {
        format!("data.{}.{}", self.type_name, self.label)
    }
}

/// Caller-supplied inputs of an evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Values for declared variables.
    pub vars: Map<String, Value>,
    /// Extra top-level names visible to expressions. An `atlas` object is
    /// merged into the `atlas` namespace.
    pub injected: Map<String, Value>,
}

impl EvalOptions {
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn inject(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.injected.insert(name.into(), value.into());
        self
    }
}

/// The result of an evaluation, with the context that owns any directories
/// published while producing it.
#[derive(Debug)]
pub struct Evaluation<T> {
    pub value: T,
    pub context: EvalContext,
}

impl<T> Evaluation<T> {
    /// Open a directory published during this evaluation.
    pub fn open_dir(&self, url: &str) -> Option<Arc<MemDir>> {
        self.context.dirs().open(url)
    }
}

/// A parsed configuration document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    variables: IndexMap<String, Variable>,
    cloud: Option<Value>,
    data: IndexMap<String, DataBlock>,
    outputs: Map<String, Value>,
}

impl Document {
    pub fn parse(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source)?;
        let root = serde_json::to_value(table).map_err(|e| CoreError::document(e.to_string()))?;
        let Value::Object(root) = root else {
            return Err(CoreError::document("expected a table at the top level"));
        };

        let mut doc = Document::default();
        for (key, value) in root {
            match key.as_str() {
                "variable" => doc.parse_variables(value)?,
                "atlas" => doc.parse_atlas(value)?,
                "data" => doc.parse_data(value)?,
                _ => {
                    doc.outputs.insert(key, value);
                }
            }
        }
        Ok(doc)
    }

    fn parse_variables(&mut self, value: Value) -> Result<()> {
        for (name, decl) in table(value, "variable")? {
            let decl = match decl {
                Value::Object(_) => serde_json::from_value(decl)
                    .map_err(|e| CoreError::document(format!("variable.{name}: {e}")))?,
                _ => return Err(CoreError::document(format!("variable.{name} must be a table"))),
            };
            self.variables.insert(name, decl);
        }
        Ok(())
    }

    fn parse_atlas(&mut self, value: Value) -> Result<()> {
        if value.is_array() {
            return Err(CoreError::document("the atlas block may only be declared once"));
        }
        for (key, value) in table(value, "atlas")? {
            match (key.as_str(), value) {
                ("cloud", Value::Array(_)) => {
                    return Err(CoreError::document("the atlas.cloud block may only be declared once"));
                }
                ("cloud", value @ Value::Object(_)) => self.cloud = Some(value),
                (other, _) => {
                    return Err(CoreError::document(format!("unsupported block atlas.{other}")));
                }
            }
        }
        Ok(())
    }

    fn parse_data(&mut self, value: Value) -> Result<()> {
        for (type_name, blocks) in table(value, "data")? {
            for (label, attrs) in table(blocks, &format!("data.{type_name}"))? {
                let block = DataBlock {
                    type_name: type_name.clone(),
                    label,
                    attrs,
                };
                if !block.attrs.is_object() {
                    return Err(CoreError::document(format!(
                        "{} must be declared once, as a table",
                        block.path()
                    )));
                }
                self.data.insert(block.path(), block);
            }
        }
        Ok(())
    }

    pub fn variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    pub fn data_blocks(&self) -> impl Iterator<Item = &DataBlock> {
        self.data.values()
    }

    /// Evaluate the document and decode its outputs into `T`.
    pub async fn eval<T: DeserializeOwned>(
        &self,
        registry: &DataSourceRegistry,
        options: EvalOptions,
    ) -> Result<Evaluation<T>> {
        let vars = self.resolve_variables(options.vars)?;
        let mut atlas = match options.injected.get("atlas") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        let cloud = match &self.cloud {
            Some(raw) => {
                // The cloud block cannot see itself or any data block.
                let bare = Value::Object(atlas.clone());
                let scope = Namespace {
                    vars: &vars,
                    injected: &options.injected,
                    atlas: &bare,
                    data: None,
                };
                let attrs = expr::eval_value(raw, &scope)?;
                let cloud: CloudConfig = serde_json::from_value(attrs)
                    .map_err(|e| CoreError::document(format!("atlas.cloud: {e}")))?;
                Some(cloud)
            }
            None => None,
        };
        atlas.insert(
            "cloud".to_string(),
            cloud.as_ref().map_or(Value::Null, CloudConfig::external_view),
        );
        let atlas = Value::Object(atlas);

        let mut context = match cloud {
            Some(cloud) => EvalContext::with_cloud(cloud),
            None => EvalContext::new(),
        };

        let mut results: HashMap<String, Value> = HashMap::new();
        for path in self.resolution_order()? {
            if results.contains_key(&path) {
                continue;
            }
            let block = &self.data[&path];
            let attrs = {
                let scope = Namespace {
                    vars: &vars,
                    injected: &options.injected,
                    atlas: &atlas,
                    data: Some(&results),
                };
                expr::eval_value(&block.attrs, &scope)?
            };
            let value = registry
                .resolve(&block.type_name, &block.label, attrs, &mut context)
                .await?;
            results.insert(path, value);
        }
        info!(blocks = results.len(), "resolved data blocks");

        let scope = Namespace {
            vars: &vars,
            injected: &options.injected,
            atlas: &atlas,
            data: Some(&results),
        };
        let mut outputs = Map::new();
        for (key, value) in &self.outputs {
            outputs.insert(key.clone(), expr::eval_value(value, &scope)?);
        }
        let value = serde_json::from_value(Value::Object(outputs)).map_err(CoreError::Output)?;
        Ok(Evaluation { value, context })
    }

    fn resolve_variables(&self, mut inputs: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut vars = Map::new();
        for (name, decl) in &self.variables {
            let value = match inputs.remove(name) {
                Some(value) => decl.coerce(name, value)?,
                None => decl
                    .default
                    .clone()
                    .ok_or_else(|| CoreError::MissingVariable(name.clone()))?,
            };
            vars.insert(name.clone(), value);
        }
        for name in inputs.keys() {
            debug!(variable = %name, "ignoring undeclared input variable");
        }
        Ok(vars)
    }

    /// Data block paths ordered so that every block comes after the blocks
    /// it references.
    fn resolution_order(&self) -> Result<Vec<String>> {
        let mut deps: HashMap<&str, Vec<String>> = HashMap::new();
        for (path, block) in &self.data {
            let mut refs = Vec::new();
            expr::references(&block.attrs, &mut refs)?;
            let mut targets = Vec::new();
            for reference in refs.iter().filter(|r| r.root == "data") {
                let target = reference
                    .data_block()
                    .filter(|t| self.data.contains_key(t))
                    .ok_or_else(|| CoreError::UnknownReference(reference.to_string()))?;
                targets.push(target);
            }
            deps.insert(path.as_str(), targets);
        }

        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        fn visit<'a>(
            path: &'a str,
            deps: &'a HashMap<&str, Vec<String>>,
            marks: &mut HashMap<&'a str, Mark>,
            order: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(path) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(CoreError::Cycle(path.to_string())),
                None => {}
            }
            marks.insert(path, Mark::Visiting);
            for dep in deps.get(path).into_iter().flatten() {
                visit(dep, deps, marks, order)?;
            }
            marks.insert(path, Mark::Done);
            order.push(path.to_string());
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::with_capacity(self.data.len());
        for path in self.data.keys() {
            visit(path, &deps, &mut marks, &mut order)?;
        }
        Ok(order)
    }
}

/// Names visible to expressions.
struct Namespace<'a> {
    vars: &'a Map<String, Value>,
    injected: &'a Map<String, Value>,
    atlas: &'a Value,
    /// Resolved data blocks, `None` where data blocks may not be referenced.
    data: Option<&'a HashMap<String, Value>>,
}

impl Scope for Namespace<'_> {
    fn lookup(&self, reference: &Reference) -> Result<Value> {
        let unknown = || CoreError::UnknownReference(reference.to_string());
        match reference.root.as_str() {
            "var" => {
                let name = reference.attr(0).ok_or_else(unknown)?;
                let value = self.vars.get(name).ok_or_else(unknown)?;
                walk(value, &reference.steps[1..], reference)
            }
            "data" => {
                let block = reference.data_block().ok_or_else(unknown)?;
                let value = self.data.and_then(|d| d.get(&block)).ok_or_else(unknown)?;
                let Some(attr) = reference.attr(2) else {
                    return walk(value, &reference.steps[2..], reference);
                };
                let value = value.get(attr).ok_or_else(|| CoreError::UnavailableAttribute {
                    block,
                    attribute: attr.to_string(),
                })?;
                walk(value, &reference.steps[3..], reference)
            }
            "atlas" => walk(self.atlas, &reference.steps, reference),
            root => {
                let value = self.injected.get(root).ok_or_else(unknown)?;
                walk(value, &reference.steps, reference)
            }
        }
    }
}

fn walk(mut value: &Value, steps: &[Step], reference: &Reference) -> Result<Value> {
    for step in steps {
        let next = match step {
            Step::Attr(name) => value.as_object().and_then(|m| m.get(name)),
            Step::Index(i) => value.as_array().and_then(|a| a.get(*i)),
        };
        value = next.ok_or_else(|| CoreError::UnknownReference(reference.to_string()))?;
    }
    Ok(value.clone())
}

fn table(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::document(format!(
            "{what} must be a table, got {}",
            kind(&other)
        ))),
    }
}
