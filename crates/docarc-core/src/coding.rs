//! The coding contract and object materialization.
//!
//! Application object types implement [`Coding`] to participate in tree
//! traversal. Materialization ("inflation") is driven entirely by the
//! document accessors; a type's `decode` only extracts its own fields.
//! The fixed wrapper in [`inflate`] performs the base steps every time —
//! adopt the node's reference locator, apply the type's cast schema —
//! so there is no must-call-super convention to forget.
//!
//! Cycle safety rests on one ordering rule: the memoized instance is
//! bound to the node *before* its decode runs, so a cyclic reference
//! reaching back to the same node observes the same, possibly partially
//! populated, instance instead of re-entering materialization.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::cast::Schema;
use crate::document::{Document, REF_KEY};
use crate::error::{Error, Result};
use crate::uri::RefUri;
use crate::value::{NodeId, Value};

/// A shared, mutable handle to a materialized application object.
pub type Shared<T> = Rc<RefCell<T>>;

/// The two-operation polymorphic contract for application object types.
pub trait Coding: 'static {
    /// The per-type cast schema, applied to the node before any field
    /// extraction. Defaults to no casting.
    fn cast_schema() -> Schema
    where
        Self: Sized,
    {
        Schema::default()
    }

    /// The object's reference locator, if it stands for a node elsewhere
    /// in the document. An object carrying one is encoded as a pointer
    /// only; its fields are never emitted alongside it.
    fn reference_uri(&self) -> Option<&RefUri> {
        None
    }

    /// Adopt a reference locator during materialization. Types that can
    /// appear as reference targets should store it.
    fn set_reference_uri(&mut self, _uri: RefUri) {}

    /// Extract this type's fields from the node. Runs after the base
    /// steps; only field extraction belongs here.
    fn decode(&mut self, doc: &mut Document, node: NodeId) -> Result<()>;

    /// Write this type's fields into the node. Pointer emission for
    /// referencing objects is the caller's job, never this method's.
    fn encode(&self, doc: &mut Document, node: NodeId) -> Result<()>;
}

/// Materialize the application object for a map node, at most once.
///
/// A node with a resolved reference target forwards to that target, so
/// every pointer to the same node yields the identical instance. An
/// unresolved pointer node materializes standalone: it adopts its own
/// locator and its fields decode through whatever its local map holds.
pub fn inflate<T, F>(doc: &mut Document, id: NodeId, factory: F) -> Result<Shared<T>>
where
    T: Coding,
    F: FnOnce() -> T,
{
    if let Some(existing) = memoized::<T>(doc, id)? {
        trace!(node = ?id, "memoized instance reused");
        return Ok(existing);
    }

    let target = chase(doc, id);
    if target != id {
        if let Some(existing) = memoized::<T>(doc, target)? {
            doc.set_inflated(id, existing.clone());
            return Ok(existing);
        }
    }

    let object = Rc::new(RefCell::new(factory()));

    // Bind the memo before decoding; this is what terminates cycles.
    doc.set_inflated(target, object.clone());
    if target != id {
        doc.set_inflated(id, object.clone());
    }

    if let Some(uri) = doc.reference_uri(target).cloned() {
        object.borrow_mut().set_reference_uri(uri);
    }
    doc.cast_values(target, &T::cast_schema())?;
    object.borrow_mut().decode(doc, target)?;

    Ok(object)
}

/// Follow resolved reference edges to the node a pointer stands for.
/// Hop count capped by the arena size so pointer chains that loop
/// terminate at some node in the cycle.
fn chase(doc: &Document, id: NodeId) -> NodeId {
    let mut cur = id;
    for _ in 0..doc.len() {
        match doc.object_reference(cur) {
            Some(next) if next != cur => cur = next,
            _ => break,
        }
    }
    cur
}

fn memoized<T: Coding>(doc: &Document, id: NodeId) -> Result<Option<Shared<T>>> {
    let Some(any) = doc.inflated(id) else {
        return Ok(None);
    };
    let any: Rc<dyn Any> = any.clone();
    any.downcast::<RefCell<T>>()
        .map(Some)
        .map_err(|_| Error::InflationConflict {
            expected: type_name::<T>(),
        })
}

impl Document {
    // ------------------------------------------------------------------
    // Object readers
    // ------------------------------------------------------------------

    /// Materialize the object stored under `key`. Absent or null keys
    /// come back as `None`; a non-map value is a type mismatch.
    pub fn get_object<T, F>(&mut self, id: NodeId, key: &str, factory: F) -> Result<Option<Shared<T>>>
    where
        T: Coding,
        F: FnOnce() -> T,
    {
        let Some(value) = self.get(id, key).cloned() else {
            return Ok(None);
        };
        self.materialize_value(key, value, factory)
    }

    /// Materialize every element of the list stored under `key`. Null
    /// elements pass through as `None` at their position without
    /// materialization; any other non-map element fails immediately.
    pub fn get_objects<T, F>(
        &mut self,
        id: NodeId,
        key: &str,
        factory: F,
    ) -> Result<Option<Vec<Option<Shared<T>>>>>
    where
        T: Coding,
        F: Fn() -> T,
    {
        let Some(value) = self.get(id, key).cloned() else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let Some(list) = value.as_node().filter(|n| self.is_list(*n)) else {
            return Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "list",
                found: self.kind_of(&value),
            });
        };
        let items = self.items(list).to_vec();
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            out.push(self.materialize_value(&index.to_string(), item, &factory)?);
        }
        Ok(Some(out))
    }

    /// Materialize every value of the map stored under `key`, preserving
    /// the key set and its order. Null values pass through as `None`.
    pub fn get_object_map<T, F>(
        &mut self,
        id: NodeId,
        key: &str,
        factory: F,
    ) -> Result<Option<IndexMap<String, Option<Shared<T>>>>>
    where
        T: Coding,
        F: Fn() -> T,
    {
        let Some(value) = self.get(id, key).cloned() else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let Some(map) = value.as_node().filter(|n| self.is_map(*n)) else {
            return Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "map",
                found: self.kind_of(&value),
            });
        };
        let entries: Vec<(String, Value)> = self
            .map_node(map)
            .map(|m| m.entries().clone().into_iter().collect())
            .unwrap_or_default();
        let mut out = IndexMap::with_capacity(entries.len());
        for (k, v) in entries {
            let object = self.materialize_value(&k, v, &factory)?;
            out.insert(k, object);
        }
        Ok(Some(out))
    }

    fn materialize_value<T, F>(
        &mut self,
        key: &str,
        value: Value,
        factory: F,
    ) -> Result<Option<Shared<T>>>
    where
        T: Coding,
        F: FnOnce() -> T,
    {
        match value {
            Value::Null => Ok(None),
            Value::Node(nid) if self.is_map(nid) => inflate(self, nid, factory).map(Some),
            other => Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "map",
                found: self.kind_of(&other),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Object writers
    // ------------------------------------------------------------------

    /// Encode an object under `key`. `None` is a no-op. An object whose
    /// reference locator is set collapses to a pointer-only node,
    /// `{"$ref": fragment}`, and its encode is never invoked; fields on
    /// a referencing object are not emitted alongside the pointer.
    pub fn put_object<T: Coding>(
        &mut self,
        id: NodeId,
        key: &str,
        object: Option<&Shared<T>>,
    ) -> Result<()> {
        let Some(object) = object else {
            return Ok(());
        };
        let child = self.deflate(object)?;
        self.set(id, key, Value::Node(child));
        Ok(())
    }

    /// Encode a sequence of objects under `key`, preserving null
    /// elements at their positions. `None` is a no-op.
    pub fn put_objects<T: Coding>(
        &mut self,
        id: NodeId,
        key: &str,
        objects: Option<&[Option<Shared<T>>]>,
    ) -> Result<()> {
        let Some(objects) = objects else {
            return Ok(());
        };
        let list = self.push_list();
        for object in objects {
            let value = match object {
                None => Value::Null,
                Some(o) => Value::Node(self.deflate(o)?),
            };
            self.list_push(list, value);
        }
        self.set(id, key, Value::Node(list));
        Ok(())
    }

    /// Encode a map of objects under `key`, preserving the source key
    /// set and order, with null values kept. `None` is a no-op.
    pub fn put_object_map<T: Coding>(
        &mut self,
        id: NodeId,
        key: &str,
        objects: Option<&IndexMap<String, Option<Shared<T>>>>,
    ) -> Result<()> {
        let Some(objects) = objects else {
            return Ok(());
        };
        let map = self.push_map();
        for (k, object) in objects {
            let value = match object {
                None => Value::Null,
                Some(o) => Value::Node(self.deflate(o)?),
            };
            self.set(map, k.clone(), value);
        }
        self.set(id, key, Value::Node(map));
        Ok(())
    }

    fn deflate<T: Coding>(&mut self, object: &Shared<T>) -> Result<NodeId> {
        if let Some(uri) = object.borrow().reference_uri().cloned() {
            let node = self.push_map();
            self.set(node, REF_KEY, Value::String(uri.to_fragment()));
            self.set_reference_uri(node, uri);
            return Ok(node);
        }
        let node = self.push_map();
        object.borrow().encode(self, node)?;
        Ok(node)
    }

    /// Archive one object into a fresh raw tree: encode it into a new
    /// document's root and unwrap.
    pub fn archive<T: Coding>(object: &Shared<T>) -> Result<serde_json::Value> {
        let mut doc = Document::new();
        let root = doc.root();
        object.borrow().encode(&mut doc, root)?;
        Ok(doc.to_raw())
    }
}
