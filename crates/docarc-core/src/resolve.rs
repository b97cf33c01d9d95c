//! The reference resolver.
//!
//! [`resolve`] turns one path locator into a node handle by folding over
//! its segments from the document root. [`resolve_all`] walks the whole
//! tree and assigns every pending reference its target exactly once.
//!
//! Resolution is pure lookup: it never materializes objects, so self-
//! and mutually-referencing pointers terminate without recursion. Any
//! path that does not land on a map node is fatal to the whole pass.

use tracing::{debug, trace};

use crate::document::{Document, Node};
use crate::error::{Error, Result};
use crate::uri::RefUri;
use crate::value::{NodeId, Value};

/// Resolve one locator against the document root.
///
/// Each segment indexes the current map node's local entries; a missing
/// key, a scalar step, or a list node anywhere along the way (list nodes
/// are not indexable by path segment) yields `None`. The final node must
/// be a map node.
pub fn resolve(doc: &Document, uri: &RefUri) -> Option<NodeId> {
    let mut cur = doc.root();
    for segment in uri.segments() {
        let map = doc.map_node(cur)?;
        match map.entries().get(segment.as_str()) {
            Some(Value::Node(next)) => cur = *next,
            _ => return None,
        }
    }
    doc.map_node(cur).map(|_| cur)
}

/// Resolve every pending reference in the document.
///
/// Depth-first over map and list nodes from the root; each map node with
/// a reference locator and no target yet gets its target assigned via
/// [`resolve`]. An unresolvable locator aborts the whole pass with
/// [`Error::UnresolvedReference`] naming the path; there is no partial
/// success.
///
/// Runs once per document lifecycle: a second call is a no-op.
pub fn resolve_all(doc: &mut Document) -> Result<()> {
    if doc.is_resolved() {
        trace!("references already resolved, skipping");
        return Ok(());
    }

    let mut assigned = 0usize;
    let mut stack = vec![doc.root()];
    while let Some(id) = stack.pop() {
        match doc.node(id) {
            Node::Map(m) => {
                for value in m.entries().values() {
                    if let Value::Node(child) = value {
                        stack.push(*child);
                    }
                }
            }
            Node::List(l) => {
                for value in l.items() {
                    if let Value::Node(child) = value {
                        stack.push(*child);
                    }
                }
            }
        }

        let pending = doc.map_node(id).and_then(|m| {
            if m.object_reference().is_none() {
                m.reference_uri().cloned()
            } else {
                None
            }
        });
        if let Some(uri) = pending {
            let target = resolve(doc, &uri).ok_or_else(|| Error::UnresolvedReference {
                path: uri.path(),
            })?;
            trace!(path = %uri, ?target, "resolved reference");
            doc.set_object_reference(id, target);
            assigned += 1;
        }
    }

    doc.mark_resolved();
    debug!(references = assigned, nodes = doc.len(), "reference resolution complete");
    Ok(())
}
