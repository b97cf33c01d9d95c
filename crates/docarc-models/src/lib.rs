//! Sample application model types for the docarc document object model.
//!
//! `Person` and `Team` exercise the full coding contract: scalar and
//! timestamp fields, cast schemas, object links that may be cyclic, and
//! object lists/maps with nullable entries. The integration tests under
//! `tests/` drive the end-to-end unarchive/decode/encode/archive flow
//! through these types.

use indexmap::IndexMap;
use time::OffsetDateTime;

use docarc_core::{Cast, Coding, Document, NodeId, RefUri, Result, Schema, Shared, Value};

/// A person, possibly linked into a cyclic child/parent graph.
///
/// No derived `Debug`: cyclic `Shared` links would recurse.
#[derive(Default)]
pub struct Person {
    pub name: Option<String>,
    pub joined: Option<OffsetDateTime>,
    pub nicknames: Vec<String>,
    pub reference: Option<RefUri>,
    pub child: Option<Shared<Person>>,
    pub parent: Option<Shared<Person>>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Person {
            name: Some(name.to_string()),
            ..Person::default()
        }
    }

    /// A pointer-only stand-in for the person at `path`; encodes as
    /// `{"$ref": "#" + path}`.
    pub fn reference_to(path: &str) -> Result<Self> {
        Ok(Person {
            reference: Some(RefUri::from_path(path)?),
            ..Person::default()
        })
    }
}

impl Coding for Person {
    fn cast_schema() -> Schema {
        Schema::new()
            .rule("name", Cast::Str)
            .rule("nicknames", Cast::list(Cast::Str))
    }

    fn reference_uri(&self) -> Option<&RefUri> {
        self.reference.as_ref()
    }

    fn set_reference_uri(&mut self, uri: RefUri) {
        self.reference = Some(uri);
    }

    fn decode(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        self.name = doc.get_str(node, "name")?.map(str::to_string);
        self.joined = doc.get_datetime(node, "joined")?;
        self.nicknames.clear();
        if let Some(list) = doc.get_value(node, "nicknames").and_then(Value::as_node) {
            for item in doc.items(list).to_vec() {
                if let Value::String(s) = item {
                    self.nicknames.push(s);
                }
            }
        }
        self.child = doc.get_object(node, "child", Person::default)?;
        self.parent = doc.get_object(node, "parent", Person::default)?;
        Ok(())
    }

    fn encode(&self, doc: &mut Document, node: NodeId) -> Result<()> {
        doc.put_str(node, "name", self.name.as_deref());
        doc.put_datetime(node, "joined", self.joined)?;
        if !self.nicknames.is_empty() {
            let list = doc.push_list();
            for nickname in &self.nicknames {
                doc.list_push(list, Value::string(nickname));
            }
            doc.set(node, "nicknames", Value::Node(list));
        }
        doc.put_object(node, "child", self.child.as_ref())?;
        doc.put_object(node, "parent", self.parent.as_ref())?;
        Ok(())
    }
}

/// A team: one manager link, an ordered member list with possible gaps,
/// and a seat map keyed by seat name.
#[derive(Default)]
pub struct Team {
    pub name: Option<String>,
    pub reference: Option<RefUri>,
    pub manager: Option<Shared<Person>>,
    pub members: Option<Vec<Option<Shared<Person>>>>,
    pub seats: Option<IndexMap<String, Option<Shared<Person>>>>,
}

impl Team {
    pub fn named(name: &str) -> Self {
        Team {
            name: Some(name.to_string()),
            ..Team::default()
        }
    }
}

impl Coding for Team {
    fn cast_schema() -> Schema {
        Schema::new().rule("name", Cast::Str)
    }

    fn reference_uri(&self) -> Option<&RefUri> {
        self.reference.as_ref()
    }

    fn set_reference_uri(&mut self, uri: RefUri) {
        self.reference = Some(uri);
    }

    fn decode(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        self.name = doc.get_str(node, "name")?.map(str::to_string);
        self.manager = doc.get_object(node, "manager", Person::default)?;
        self.members = doc.get_objects(node, "members", Person::default)?;
        self.seats = doc.get_object_map(node, "seats", Person::default)?;
        Ok(())
    }

    fn encode(&self, doc: &mut Document, node: NodeId) -> Result<()> {
        doc.put_str(node, "name", self.name.as_deref());
        doc.put_object(node, "manager", self.manager.as_ref())?;
        doc.put_objects(node, "members", self.members.as_deref())?;
        doc.put_object_map(node, "seats", self.seats.as_ref())?;
        Ok(())
    }
}
