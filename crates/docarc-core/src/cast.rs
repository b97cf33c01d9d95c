//! The cast engine: a combinator algebra for structural type coercion.
//!
//! A [`Cast`] checks that a value's runtime shape satisfies a declared
//! target shape, recursing into container nodes. Failures carry the
//! structural position of the offending value as a [`CastError`].
//!
//! Casting runs before field extraction during materialization: the
//! [`Coding::cast_schema`](crate::coding::Coding::cast_schema) of an
//! application type is applied to a node through
//! [`Document::cast_values`] as the first step of its decode.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::document::Document;
use crate::value::{NodeId, Value};

/// Structural position of a cast failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastContext {
    Toplevel,
    MapEntry,
    ListEntry,
}

impl fmt::Display for CastContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastContext::Toplevel => write!(f, "toplevel"),
            CastContext::MapEntry => write!(f, "map entry"),
            CastContext::ListEntry => write!(f, "list entry"),
        }
    }
}

/// A cast failure with positional diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastError {
    /// Where in the structure the failure occurred.
    pub context: CastContext,
    /// The offending map key or list index, if not at the top level.
    pub key: Option<String>,
    pub message: String,
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "cast failed at {} '{}': {}", self.context, key, self.message),
            None => write!(f, "cast failed at {}: {}", self.context, self.message),
        }
    }
}

impl std::error::Error for CastError {}

/// A per-key cast schema: keys present in the schema are cast per their
/// rule; keys absent from it pass through unchanged.
#[derive(Clone, Default)]
pub struct Schema {
    rules: IndexMap<String, Cast>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Add a rule for one key, builder style.
    pub fn rule(mut self, key: impl Into<String>, cast: Cast) -> Self {
        self.rules.insert(key.into(), cast);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cast)> {
        self.rules.iter()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.rules.iter()).finish()
    }
}

/// A structural coercion rule.
#[derive(Clone)]
pub enum Cast {
    /// Accept booleans.
    Bool,
    /// Accept integral numbers.
    Int,
    /// Accept any number.
    Float,
    /// Accept strings.
    Str,
    /// Accept anything (identity).
    Any,
    /// Accept a list node, casting each element; null elements pass
    /// through untouched at their position.
    List(Box<Cast>),
    /// Accept a map node, casting every key and value. The key cast is
    /// applied to the key as a string value and must yield a string.
    Map(Box<Cast>, Box<Cast>),
    /// Accept a map node with string keys, casting every value.
    StringMap(Box<Cast>),
    /// Accept a map node, casting per the schema; unknown keys pass
    /// through.
    Keyed(Schema),
    /// Try the first cast; on failure, try the second.
    OneOf(Box<Cast>, Box<Cast>),
    /// Cast with the inner rule, then apply a pure transform.
    Apply(Rc<dyn Fn(Value) -> Value>, Box<Cast>),
    /// Defer construction of the rule until cast time. This is what lets
    /// a schema refer to itself (recursive shapes).
    Lazy(Rc<dyn Fn() -> Cast>),
}

impl Cast {
    pub fn list(inner: Cast) -> Self {
        Cast::List(Box::new(inner))
    }

    pub fn map(keys: Cast, values: Cast) -> Self {
        Cast::Map(Box::new(keys), Box::new(values))
    }

    pub fn string_map(values: Cast) -> Self {
        Cast::StringMap(Box::new(values))
    }

    pub fn keyed(schema: Schema) -> Self {
        Cast::Keyed(schema)
    }

    pub fn one_of(a: Cast, b: Cast) -> Self {
        Cast::OneOf(Box::new(a), Box::new(b))
    }

    pub fn apply(transform: impl Fn(Value) -> Value + 'static, inner: Cast) -> Self {
        Cast::Apply(Rc::new(transform), Box::new(inner))
    }

    pub fn lazy(thunk: impl Fn() -> Cast + 'static) -> Self {
        Cast::Lazy(Rc::new(thunk))
    }

    /// Cast a value at the top level.
    pub fn cast(&self, doc: &mut Document, value: Value) -> Result<Value, CastError> {
        self.cast_at(doc, value, CastContext::Toplevel, None)
    }

    fn cast_at(
        &self,
        doc: &mut Document,
        value: Value,
        context: CastContext,
        key: Option<&str>,
    ) -> Result<Value, CastError> {
        match self {
            Cast::Any => Ok(value),
            Cast::Bool => match value {
                Value::Bool(_) => Ok(value),
                other => Err(mismatch(doc, "boolean", &other, context, key)),
            },
            Cast::Int => {
                let integral = matches!(
                    &value,
                    Value::Number(n) if n.as_i64().is_some() || n.as_u64().is_some()
                );
                if integral {
                    Ok(value)
                } else {
                    Err(mismatch(doc, "integer", &value, context, key))
                }
            }
            Cast::Float => match value {
                Value::Number(_) => Ok(value),
                other => Err(mismatch(doc, "number", &other, context, key)),
            },
            Cast::Str => match value {
                Value::String(_) => Ok(value),
                other => Err(mismatch(doc, "string", &other, context, key)),
            },
            Cast::List(inner) => {
                let id = expect_list(doc, &value, context, key)?;
                let items = doc.items(id).to_vec();
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    if item.is_null() {
                        out.push(item);
                        continue;
                    }
                    let index = index.to_string();
                    out.push(inner.cast_at(doc, item, CastContext::ListEntry, Some(index.as_str()))?);
                }
                doc.set_items(id, out);
                Ok(value)
            }
            Cast::Map(keys, values) => {
                let id = expect_map(doc, &value, context, key)?;
                let entries: Vec<(String, Value)> = doc
                    .map_node(id)
                    .map(|m| m.entries().clone().into_iter().collect())
                    .unwrap_or_default();
                let mut out = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    let cast_key = keys.cast_at(
                        doc,
                        Value::String(k.clone()),
                        CastContext::MapEntry,
                        Some(k.as_str()),
                    )?;
                    let Value::String(new_key) = cast_key else {
                        return Err(CastError {
                            context: CastContext::MapEntry,
                            key: Some(k),
                            message: "key cast must produce a string".to_string(),
                        });
                    };
                    let new_value = if v.is_null() {
                        v
                    } else {
                        values.cast_at(doc, v, CastContext::MapEntry, Some(new_key.as_str()))?
                    };
                    out.insert(new_key, new_value);
                }
                doc.set_entries(id, out);
                Ok(value)
            }
            Cast::StringMap(values) => {
                Cast::Map(Box::new(Cast::Str), values.clone()).cast_at(doc, value, context, key)
            }
            Cast::Keyed(schema) => {
                let id = expect_map(doc, &value, context, key)?;
                apply_keyed(doc, id, schema)?;
                Ok(value)
            }
            Cast::OneOf(a, b) => match a.cast_at(doc, value.clone(), context, key) {
                Ok(v) => Ok(v),
                Err(_) => b.cast_at(doc, value, context, key),
            },
            Cast::Apply(transform, inner) => {
                let v = inner.cast_at(doc, value, context, key)?;
                Ok(transform(v))
            }
            Cast::Lazy(thunk) => thunk().cast_at(doc, value, context, key),
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Bool => write!(f, "Bool"),
            Cast::Int => write!(f, "Int"),
            Cast::Float => write!(f, "Float"),
            Cast::Str => write!(f, "Str"),
            Cast::Any => write!(f, "Any"),
            Cast::List(inner) => f.debug_tuple("List").field(inner).finish(),
            Cast::Map(k, v) => f.debug_tuple("Map").field(k).field(v).finish(),
            Cast::StringMap(v) => f.debug_tuple("StringMap").field(v).finish(),
            Cast::Keyed(schema) => f.debug_tuple("Keyed").field(schema).finish(),
            Cast::OneOf(a, b) => f.debug_tuple("OneOf").field(a).field(b).finish(),
            Cast::Apply(_, inner) => f.debug_tuple("Apply").field(&"<fn>").field(inner).finish(),
            Cast::Lazy(_) => f.debug_tuple("Lazy").field(&"<fn>").finish(),
        }
    }
}

fn mismatch(
    doc: &Document,
    expected: &str,
    found: &Value,
    context: CastContext,
    key: Option<&str>,
) -> CastError {
    CastError {
        context,
        key: key.map(str::to_string),
        message: format!("expected {expected}, found {}", doc.kind_of(found)),
    }
}

fn expect_map(
    doc: &Document,
    value: &Value,
    context: CastContext,
    key: Option<&str>,
) -> Result<NodeId, CastError> {
    match value.as_node() {
        Some(id) if doc.is_map(id) => Ok(id),
        _ => Err(mismatch(doc, "map", value, context, key)),
    }
}

fn expect_list(
    doc: &Document,
    value: &Value,
    context: CastContext,
    key: Option<&str>,
) -> Result<NodeId, CastError> {
    match value.as_node() {
        Some(id) if doc.is_list(id) => Ok(id),
        _ => Err(mismatch(doc, "list", value, context, key)),
    }
}

fn apply_keyed(doc: &mut Document, id: NodeId, schema: &Schema) -> Result<(), CastError> {
    for (key, rule) in schema.iter() {
        let Some(v) = doc.get_local(id, key).cloned() else {
            continue;
        };
        if v.is_null() {
            continue;
        }
        let new_value = rule.cast_at(doc, v, CastContext::MapEntry, Some(key.as_str()))?;
        doc.set(id, key.clone(), new_value);
    }
    Ok(())
}

impl Document {
    /// Apply a keyed schema to a node's local map in place.
    ///
    /// If the node has a resolved reference target, the target's local
    /// map is re-cast with the same schema. One level only: a chain of
    /// references-to-references is not walked.
    pub fn cast_values(&mut self, id: NodeId, schema: &Schema) -> Result<(), CastError> {
        if schema.is_empty() {
            return Ok(());
        }
        apply_keyed(self, id, schema)?;
        if let Some(target) = self.object_reference(id) {
            if target != id {
                apply_keyed(self, target, schema)?;
            }
        }
        Ok(())
    }
}
