//! Archive/unarchive round trips: scalar encoding, cast schemas, and
//! byte-identical stability for documents with reference cycles.

use std::cell::RefCell;
use std::rc::Rc;

use docarc_models::{Person, Team};
use serde_json::json;
use time::macros::datetime;

use docarc_core::{Document, Error, Shared};

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

#[test]
fn test_scalar_fields_round_trip() {
    let mut person = Person::named("Ada");
    person.joined = Some(datetime!(2024-03-01 09:30:00 UTC));
    person.nicknames = vec!["countess".to_string(), "al".to_string()];
    let person = shared(person);

    let raw = Document::archive(&person).unwrap();
    assert_eq!(raw["joined"], json!("2024-03-01T09:30:00Z"));
    assert_eq!(raw["nicknames"], json!(["countess", "al"]));

    let mut doc = Document::unarchive(&raw, false).unwrap();
    let root = doc.root();
    let mut decoded = Person::default();
    docarc_core::Coding::decode(&mut decoded, &mut doc, root).unwrap();
    assert_eq!(decoded.name.as_deref(), Some("Ada"));
    assert_eq!(decoded.joined, person.borrow().joined);
    assert_eq!(decoded.nicknames, person.borrow().nicknames);
}

#[test]
fn test_cast_schema_runs_before_field_extraction() {
    // "name" must be a string per Person's schema; the failure is a
    // cast error, not a field-level mismatch.
    let raw = json!({"p": {"name": 42}});
    let mut doc = Document::unarchive(&raw, true).unwrap();
    let err = doc
        .get_object::<Person, _>(doc.root(), "p", Person::default)
        .err()
        .unwrap();
    assert!(matches!(err, Error::Cast(_)));
}

#[test]
fn test_list_schema_tolerates_null_elements() {
    let raw = json!({"p": {"name": "x", "nicknames": ["ace", null]}});
    let mut doc = Document::unarchive(&raw, true).unwrap();
    let p = doc
        .get_object(doc.root(), "p", Person::default)
        .unwrap()
        .unwrap();
    assert_eq!(p.borrow().nicknames, vec!["ace"]);
    // The raw shape is untouched by the cast.
    assert_eq!(doc.to_raw()["p"]["nicknames"], json!(["ace", null]));
}

#[test]
fn test_cyclic_archive_is_stable() {
    // Author the graph with pointer stand-ins for the back edges, the
    // way a referencing document is meant to be built.
    let child = shared(Person::named("Sally"));
    child.borrow_mut().parent = Some(shared(Person::reference_to("/parent").unwrap()));
    let parent = shared(Person::named("Bob"));
    parent.borrow_mut().child = Some(shared(Person::reference_to("/child").unwrap()));

    let mut doc = Document::new();
    let root = doc.root();
    doc.put_object(root, "child", Some(&child)).unwrap();
    doc.put_object(root, "parent", Some(&parent)).unwrap();
    let first = doc.to_raw();

    assert_eq!(
        first,
        json!({
            "child": {"name": "Sally", "parent": {"$ref": "#/parent"}},
            "parent": {"name": "Bob", "child": {"$ref": "#/child"}}
        })
    );

    // Re-parse, decode, re-archive: the output must be byte-identical.
    let mut doc = Document::unarchive(&first, false).unwrap();
    let child2 = doc
        .get_object(doc.root(), "child", Person::default)
        .unwrap()
        .unwrap();
    let parent2 = doc
        .get_object(doc.root(), "parent", Person::default)
        .unwrap()
        .unwrap();

    let mut out = Document::new();
    let root = out.root();
    out.put_object(root, "child", Some(&child2)).unwrap();
    out.put_object(root, "parent", Some(&parent2)).unwrap();
    let second = out.to_raw();

    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn test_referencing_object_collapses_to_pointer_only() {
    // Fields on a referencing object are never emitted beside the
    // pointer, even when they are populated.
    let mut ghost = Person::named("should not appear");
    ghost.reference = Some(docarc_core::RefUri::from_path("/elsewhere").unwrap());
    let holder = shared(Person::named("holder"));
    holder.borrow_mut().child = Some(shared(ghost));

    let raw = Document::archive(&holder).unwrap();
    assert_eq!(raw["child"], json!({"$ref": "#/elsewhere"}));
}

#[test]
fn test_team_containers_round_trip() {
    let mut team = Team::named("core");
    team.manager = Some(shared(Person::named("Mia")));
    team.members = Some(vec![
        Some(shared(Person::named("a"))),
        None,
        Some(shared(Person::named("b"))),
    ]);
    let mut seats = indexmap::IndexMap::new();
    seats.insert("window".to_string(), Some(shared(Person::named("c"))));
    seats.insert("aisle".to_string(), None);
    team.seats = Some(seats);
    let team = shared(team);

    let raw = Document::archive(&team).unwrap();
    assert_eq!(raw["members"][1], json!(null));
    assert_eq!(raw["seats"]["aisle"], json!(null));

    let mut doc = Document::unarchive(&raw, false).unwrap();
    let root = doc.root();
    let mut decoded = Team::default();
    docarc_core::Coding::decode(&mut decoded, &mut doc, root).unwrap();

    let members = decoded.members.as_ref().unwrap();
    assert_eq!(members.len(), 3);
    assert!(members[1].is_none());
    let seats = decoded.seats.as_ref().unwrap();
    assert_eq!(seats.keys().collect::<Vec<_>>(), vec!["window", "aisle"]);

    // A second archive of the decoded graph reproduces the document.
    let decoded = shared(decoded);
    assert_eq!(Document::archive(&decoded).unwrap(), raw);
}
