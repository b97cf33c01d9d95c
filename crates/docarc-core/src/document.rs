//! The document node tree.
//!
//! A [`Document`] owns an arena of [`Node`]s addressed by stable
//! [`NodeId`] indices. Map entries and list elements hold [`Value`]s;
//! nested containers are held by handle, so every node has exactly one
//! owner (its parent, or the document root) while resolved reference
//! edges alias freely and may form cycles.
//!
//! The raw-tree boundary is `serde_json::Value` in both directions:
//! [`Document::from_raw`] recodes a raw tree into nodes, and
//! [`Document::to_raw`] unwraps it back for the external codec. No text
//! is parsed or emitted here.

use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;

use crate::error::{Error, Result};
use crate::resolve;
use crate::uri::RefUri;
use crate::value::{NodeId, Value};

/// The map key that marks a node as a reference to another node.
pub const REF_KEY: &str = "$ref";

/// A map or list node in the document arena.
#[derive(Debug, Clone)]
pub enum Node {
    Map(MapNode),
    List(ListNode),
}

/// An insertion-ordered string-keyed map node, with reference and
/// inflation bookkeeping.
#[derive(Clone, Default)]
pub struct MapNode {
    pub(crate) entries: IndexMap<String, Value>,
    /// Present iff this node was recoded from a map carrying `"$ref"`.
    /// The literal `$ref` entry stays in `entries`; it is not stripped.
    pub(crate) reference_uri: Option<RefUri>,
    /// Alias edge to the resolved target node. Unset until the resolution
    /// pass runs; once set, never changed. Never an ownership edge.
    pub(crate) object_reference: Option<NodeId>,
    /// Memoized application object bound to this node. Written at most
    /// once, before the object's decode runs.
    pub(crate) inflated: Option<Rc<dyn Any>>,
}

impl MapNode {
    /// The locally stored entries, in insertion order. Does not follow
    /// the reference target; use [`Document::get`] for delegated lookup.
    pub fn entries(&self) -> &IndexMap<String, Value> {
        &self.entries
    }

    /// The pending or resolved reference locator, if any.
    pub fn reference_uri(&self) -> Option<&RefUri> {
        self.reference_uri.as_ref()
    }

    /// The resolved reference target, if the resolution pass has run.
    pub fn object_reference(&self) -> Option<NodeId> {
        self.object_reference
    }
}

impl std::fmt::Debug for MapNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapNode")
            .field("entries", &self.entries)
            .field("reference_uri", &self.reference_uri)
            .field("object_reference", &self.object_reference)
            .field("inflated", &self.inflated.is_some())
            .finish()
    }
}

/// An ordered sequence node; elements are independently nullable.
#[derive(Debug, Clone, Default)]
pub struct ListNode {
    pub(crate) items: Vec<Value>,
}

impl ListNode {
    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

/// A document: an arena of nodes plus the root handle.
///
/// Single-threaded and mutable; callers sharing a document across
/// threads must serialize access externally.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    resolved: bool,
}

impl Document {
    /// Create an empty document with a root map node (the archive side).
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            resolved: false,
        };
        doc.root = doc.push_map();
        doc
    }

    /// Recode a raw tree into a document without resolving references.
    ///
    /// Nested raw maps and lists become map/list nodes; a map carrying a
    /// `"$ref"` string has its value parsed as a fragment into the node's
    /// reference locator. The root must be a map or a list.
    pub fn from_raw(raw: &serde_json::Value) -> Result<Self> {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            resolved: false,
        };
        match doc.recode(raw)? {
            Value::Node(id) => {
                doc.root = id;
                Ok(doc)
            }
            other => Err(Error::UnsupportedRoot {
                found: other.kind(),
            }),
        }
    }

    /// One-shot entry point: recode a raw tree and, if asked, run the
    /// reference resolution pass. Resolution runs at most once per
    /// document lifecycle.
    pub fn unarchive(raw: &serde_json::Value, resolve_references: bool) -> Result<Self> {
        let mut doc = Document::from_raw(raw)?;
        if resolve_references {
            resolve::resolve_all(&mut doc)?;
        }
        Ok(doc)
    }

    /// The root node handle.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub(crate) fn mark_resolved(&mut self) {
        self.resolved = true;
    }

    // ------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------

    /// Borrow a node by handle.
    ///
    /// # Panics
    /// Panics if the handle does not belong to this document.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Borrow a map node, or `None` if the handle names a list node.
    pub fn map_node(&self, id: NodeId) -> Option<&MapNode> {
        match self.node(id) {
            Node::Map(m) => Some(m),
            Node::List(_) => None,
        }
    }

    pub(crate) fn map_node_mut(&mut self, id: NodeId) -> Option<&mut MapNode> {
        match self.node_mut(id) {
            Node::Map(m) => Some(m),
            Node::List(_) => None,
        }
    }

    /// Borrow a list node, or `None` if the handle names a map node.
    pub fn list_node(&self, id: NodeId) -> Option<&ListNode> {
        match self.node(id) {
            Node::List(l) => Some(l),
            Node::Map(_) => None,
        }
    }

    pub fn is_map(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Map(_))
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::List(_))
    }

    /// Append a fresh empty map node to the arena.
    pub fn push_map(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::Map(MapNode::default()));
        id
    }

    /// Append a fresh empty list node to the arena.
    pub fn push_list(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::List(ListNode::default()));
        id
    }

    /// Kind name of a value for diagnostics, distinguishing map and list
    /// nodes.
    pub fn kind_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Node(id) => match self.node(*id) {
                Node::Map(_) => "map",
                Node::List(_) => "list",
            },
            other => other.kind(),
        }
    }

    // ------------------------------------------------------------------
    // Map lookup and mutation
    // ------------------------------------------------------------------

    /// Delegated key lookup: the local map first, then the resolved
    /// reference target, transitively. The hop count is capped by the
    /// arena size so reference cycles terminate.
    pub fn get(&self, id: NodeId, key: &str) -> Option<&Value> {
        let mut cur = id;
        for _ in 0..=self.nodes.len() {
            let map = self.map_node(cur)?;
            if let Some(v) = map.entries.get(key) {
                return Some(v);
            }
            cur = map.object_reference?;
        }
        None
    }

    /// Local-only key lookup; never delegates.
    pub fn get_local(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.map_node(id)?.entries.get(key)
    }

    /// Insert or replace a local entry. Never touches the reference
    /// target. Replacing an existing key keeps its position.
    ///
    /// # Panics
    /// Panics if the handle names a list node.
    pub fn set(&mut self, id: NodeId, key: impl Into<String>, value: Value) {
        match self.node_mut(id) {
            Node::Map(m) => {
                m.entries.insert(key.into(), value);
            }
            Node::List(_) => panic!("set on list node {id:?}"),
        }
    }

    /// Remove a local entry, returning its value. Never touches the
    /// reference target.
    pub fn remove(&mut self, id: NodeId, key: &str) -> Option<Value> {
        self.map_node_mut(id)?.entries.shift_remove(key)
    }

    /// Remove every local entry. Reference bookkeeping is untouched.
    pub fn clear(&mut self, id: NodeId) {
        if let Some(m) = self.map_node_mut(id) {
            m.entries.clear();
        }
    }

    pub(crate) fn set_entries(&mut self, id: NodeId, entries: IndexMap<String, Value>) {
        if let Some(m) = self.map_node_mut(id) {
            m.entries = entries;
        }
    }

    /// The resolved reference target of a map node, if any.
    pub fn object_reference(&self, id: NodeId) -> Option<NodeId> {
        self.map_node(id)?.object_reference
    }

    /// The reference locator of a map node, if any.
    pub fn reference_uri(&self, id: NodeId) -> Option<&RefUri> {
        self.map_node(id)?.reference_uri.as_ref()
    }

    pub(crate) fn set_reference_uri(&mut self, id: NodeId, uri: RefUri) {
        if let Some(m) = self.map_node_mut(id) {
            m.reference_uri = Some(uri);
        }
    }

    pub(crate) fn set_object_reference(&mut self, id: NodeId, target: NodeId) {
        if let Some(m) = self.map_node_mut(id) {
            if m.object_reference.is_none() {
                m.object_reference = Some(target);
            }
        }
    }

    pub(crate) fn inflated(&self, id: NodeId) -> Option<&Rc<dyn Any>> {
        self.map_node(id)?.inflated.as_ref()
    }

    pub(crate) fn set_inflated(&mut self, id: NodeId, object: Rc<dyn Any>) {
        if let Some(m) = self.map_node_mut(id) {
            if m.inflated.is_none() {
                m.inflated = Some(object);
            }
        }
    }

    // ------------------------------------------------------------------
    // List access
    // ------------------------------------------------------------------

    /// The elements of a list node.
    ///
    /// # Panics
    /// Panics if the handle names a map node.
    pub fn items(&self, id: NodeId) -> &[Value] {
        match self.node(id) {
            Node::List(l) => &l.items,
            Node::Map(_) => panic!("items on map node {id:?}"),
        }
    }

    /// Append an element to a list node.
    pub fn list_push(&mut self, id: NodeId, value: Value) {
        match self.node_mut(id) {
            Node::List(l) => l.items.push(value),
            Node::Map(_) => panic!("list_push on map node {id:?}"),
        }
    }

    pub(crate) fn set_items(&mut self, id: NodeId, items: Vec<Value>) {
        if let Node::List(l) = self.node_mut(id) {
            l.items = items;
        }
    }

    // ------------------------------------------------------------------
    // Typed scalar accessors
    // ------------------------------------------------------------------

    /// Delegated lookup returning the raw value; absent and null both
    /// come back as `None`, mirroring the omit-null rule on the put side.
    pub fn get_value(&self, id: NodeId, key: &str) -> Option<&Value> {
        match self.get(id, key) {
            Some(Value::Null) | None => None,
            some => some,
        }
    }

    pub fn get_bool(&self, id: NodeId, key: &str) -> Result<Option<bool>> {
        match self.get_value(id, key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(key, "boolean", other)),
        }
    }

    pub fn get_i64(&self, id: NodeId, key: &str) -> Result<Option<i64>> {
        match self.get_value(id, key) {
            None => Ok(None),
            Some(v @ Value::Number(_)) => match v.as_i64() {
                Some(n) => Ok(Some(n)),
                None => Err(self.mismatch(key, "integer", v)),
            },
            Some(other) => Err(self.mismatch(key, "integer", other)),
        }
    }

    pub fn get_f64(&self, id: NodeId, key: &str) -> Result<Option<f64>> {
        match self.get_value(id, key) {
            None => Ok(None),
            Some(v @ Value::Number(_)) => Ok(v.as_f64()),
            Some(other) => Err(self.mismatch(key, "number", other)),
        }
    }

    pub fn get_str(&self, id: NodeId, key: &str) -> Result<Option<&str>> {
        match self.get_value(id, key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(key, "string", other)),
        }
    }

    /// Parse a string field as an RFC 3339 timestamp.
    pub fn get_datetime(&self, id: NodeId, key: &str) -> Result<Option<OffsetDateTime>> {
        match self.get_str(id, key)? {
            None => Ok(None),
            Some(s) => OffsetDateTime::parse(s, &Rfc3339)
                .map(Some)
                .map_err(|e| Error::InvalidTimestamp {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Parse a string field as a URL.
    pub fn get_url(&self, id: NodeId, key: &str) -> Result<Option<Url>> {
        match self.get_str(id, key)? {
            None => Ok(None),
            Some(s) => Url::parse(s).map(Some).map_err(|e| Error::InvalidUrl {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn mismatch(&self, key: &str, expected: &'static str, found: &Value) -> Error {
        Error::TypeMismatch {
            key: key.to_string(),
            expected,
            found: self.kind_of(found),
        }
    }

    // ------------------------------------------------------------------
    // Typed scalar writers; `None` omits the key entirely.
    // ------------------------------------------------------------------

    pub fn put_value(&mut self, id: NodeId, key: &str, value: Option<Value>) {
        if let Some(v) = value {
            self.set(id, key, v);
        }
    }

    pub fn put_bool(&mut self, id: NodeId, key: &str, value: Option<bool>) {
        self.put_value(id, key, value.map(Value::Bool));
    }

    pub fn put_i64(&mut self, id: NodeId, key: &str, value: Option<i64>) {
        self.put_value(id, key, value.map(Value::integer));
    }

    pub fn put_f64(&mut self, id: NodeId, key: &str, value: Option<f64>) {
        self.put_value(id, key, value.map(Value::float));
    }

    pub fn put_str(&mut self, id: NodeId, key: &str, value: Option<&str>) {
        self.put_value(id, key, value.map(Value::from));
    }

    /// Write a timestamp as its RFC 3339 string form.
    pub fn put_datetime(
        &mut self,
        id: NodeId,
        key: &str,
        value: Option<OffsetDateTime>,
    ) -> Result<()> {
        let Some(dt) = value else { return Ok(()) };
        let s = dt.format(&Rfc3339).map_err(|e| Error::InvalidTimestamp {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set(id, key, Value::String(s));
        Ok(())
    }

    /// Write a URL as its string form.
    pub fn put_url(&mut self, id: NodeId, key: &str, value: Option<&Url>) {
        self.put_value(id, key, value.map(|u| Value::string(u.as_str())));
    }

    // ------------------------------------------------------------------
    // Recoding (raw tree -> nodes)
    // ------------------------------------------------------------------

    fn recode(&mut self, raw: &serde_json::Value) -> Result<Value> {
        Ok(match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.clone()),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let id = self.push_list();
                for item in items {
                    let v = self.recode(item)?;
                    self.list_push(id, v);
                }
                Value::Node(id)
            }
            serde_json::Value::Object(map) => {
                let id = self.push_map();
                for (k, v) in map {
                    let value = self.recode(v)?;
                    self.set(id, k.clone(), value);
                }
                if let Some(marker) = self.get_local(id, REF_KEY).cloned() {
                    let Value::String(fragment) = marker else {
                        return Err(Error::InvalidRef {
                            value: format!("{marker:?}"),
                            message: format!("{REF_KEY:?} value must be a string"),
                        });
                    };
                    let uri = RefUri::from_fragment(&fragment)?;
                    self.set_reference_uri(id, uri);
                }
                Value::Node(id)
            }
        })
    }

    // ------------------------------------------------------------------
    // Unwrapping (nodes -> raw tree)
    // ------------------------------------------------------------------

    /// Unwrap the whole document into a raw tree, starting at the root.
    pub fn to_raw(&self) -> serde_json::Value {
        self.node_to_raw(self.root)
    }

    /// Unwrap one node subtree into a raw tree. Recurses only into
    /// locally owned children; a resolved reference target is never
    /// inlined, so a reference node round-trips as `{"$ref": "..."}`.
    pub fn node_to_raw(&self, id: NodeId) -> serde_json::Value {
        self.value_to_raw(&Value::Node(id))
    }

    fn value_to_raw(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Node(id) => match self.node(*id) {
                Node::Map(m) => serde_json::Value::Object(
                    m.entries
                        .iter()
                        .map(|(k, v)| (k.clone(), self.value_to_raw(v)))
                        .collect(),
                ),
                Node::List(l) => serde_json::Value::Array(
                    l.items.iter().map(|v| self.value_to_raw(v)).collect(),
                ),
            },
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recode_and_unwrap_round_trip() {
        let raw = json!({
            "name": "Bob",
            "age": 42,
            "tags": ["a", null, "b"],
            "nested": {"on": true}
        });
        let doc = Document::from_raw(&raw).unwrap();
        assert_eq!(doc.to_raw(), raw);
    }

    #[test]
    fn test_recode_rejects_scalar_root() {
        assert!(matches!(
            Document::from_raw(&json!(42)),
            Err(Error::UnsupportedRoot { found: "number" })
        ));
    }

    #[test]
    fn test_ref_marker_is_parsed_but_not_stripped() {
        let raw = json!({"link": {"$ref": "#/a/b"}});
        let doc = Document::from_raw(&raw).unwrap();
        let link = doc.get(doc.root(), "link").unwrap().as_node().unwrap();
        let uri = doc.reference_uri(link).unwrap();
        assert_eq!(uri.segments(), &["a", "b"]);
        // The literal entry stays in the local map and round-trips.
        assert!(doc.get_local(link, REF_KEY).is_some());
        assert_eq!(doc.to_raw(), raw);
    }

    #[test]
    fn test_ref_marker_must_be_string() {
        let raw = json!({"link": {"$ref": 7}});
        assert!(matches!(
            Document::from_raw(&raw),
            Err(Error::InvalidRef { .. })
        ));
    }

    #[test]
    fn test_mutators_touch_local_map_only() {
        let raw = json!({"target": {"x": 1}, "link": {"$ref": "#/target"}});
        let mut doc = Document::unarchive(&raw, true).unwrap();
        let link = doc.get(doc.root(), "link").unwrap().as_node().unwrap();
        let target = doc.object_reference(link).unwrap();

        // Delegated read sees the target's entry.
        assert_eq!(doc.get(link, "x").unwrap().as_i64(), Some(1));

        // Writing through the link shadows, not overwrites.
        doc.set(link, "x", Value::integer(2));
        assert_eq!(doc.get(link, "x").unwrap().as_i64(), Some(2));
        assert_eq!(doc.get(target, "x").unwrap().as_i64(), Some(1));

        // Removing locally re-exposes the delegated value.
        doc.remove(link, "x");
        assert_eq!(doc.get(link, "x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_get_value_treats_null_as_absent() {
        let raw = json!({"a": null});
        let doc = Document::from_raw(&raw).unwrap();
        assert!(doc.get(doc.root(), "a").is_some());
        assert!(doc.get_value(doc.root(), "a").is_none());
    }

    #[test]
    fn test_scalar_accessor_mismatch() {
        let raw = json!({"n": "not a number"});
        let doc = Document::from_raw(&raw).unwrap();
        let err = doc.get_i64(doc.root(), "n").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "integer", .. }));
    }

    #[test]
    fn test_datetime_round_trips_as_string() {
        let mut doc = Document::new();
        let dt = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        doc.put_datetime(doc.root(), "at", Some(dt)).unwrap();

        let raw = doc.to_raw();
        assert!(raw["at"].is_string());

        let back = Document::from_raw(&raw).unwrap();
        assert_eq!(back.get_datetime(back.root(), "at").unwrap(), Some(dt));
    }

    #[test]
    fn test_bad_datetime_is_a_format_error() {
        let raw = json!({"at": "yesterday-ish"});
        let doc = Document::from_raw(&raw).unwrap();
        assert!(matches!(
            doc.get_datetime(doc.root(), "at"),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_url_round_trips_as_string() {
        let mut doc = Document::new();
        let url = Url::parse("https://example.com/a?b=1").unwrap();
        doc.put_url(doc.root(), "home", Some(&url));

        let back = Document::from_raw(&doc.to_raw()).unwrap();
        assert_eq!(back.get_url(back.root(), "home").unwrap(), Some(url));
    }

    #[test]
    fn test_put_none_omits_key() {
        let mut doc = Document::new();
        doc.put_str(doc.root(), "a", None);
        doc.put_bool(doc.root(), "b", Some(false));
        let raw = doc.to_raw();
        assert!(raw.get("a").is_none());
        assert_eq!(raw["b"], json!(false));
    }

    #[test]
    fn test_delegation_is_transitive() {
        let raw = json!({
            "a": {"$ref": "#/b"},
            "b": {"$ref": "#/c"},
            "c": {"x": "deep"}
        });
        let doc = Document::unarchive(&raw, true).unwrap();
        let a = doc.get(doc.root(), "a").unwrap().as_node().unwrap();
        assert_eq!(doc.get(a, "x").unwrap().as_str(), Some("deep"));
    }

    #[test]
    fn test_delegation_terminates_on_reference_cycle() {
        let raw = json!({
            "a": {"$ref": "#/b"},
            "b": {"$ref": "#/a"}
        });
        let doc = Document::unarchive(&raw, true).unwrap();
        let a = doc.get(doc.root(), "a").unwrap().as_node().unwrap();
        assert!(doc.get(a, "missing").is_none());
    }
}
