//! docarc-core: a document object model for marshalling typed
//! application objects to and from a JSON-like value tree.
//!
//! Two things distinguish it from a plain tree wrapper:
//! - intra-document `$ref` pointers (JSON-Schema style) that may be
//!   cyclic, resolved in one pass and lazily materialized without
//!   unbounded recursion;
//! - a structural cast algebra that coerces untyped containers into
//!   declared shapes before field extraction.
//!
//! The raw-tree boundary is `serde_json::Value`; parsing and emitting
//! text is the external codec's job. The model is single-threaded and
//! mutable; see [`document::Document`].

pub mod cast;
pub mod coding;
pub mod document;
pub mod error;
pub mod resolve;
pub mod uri;
pub mod value;

pub use cast::{Cast, CastContext, CastError, Schema};
pub use coding::{inflate, Coding, Shared};
pub use document::{Document, ListNode, MapNode, Node, REF_KEY};
pub use error::{Error, Result};
pub use uri::RefUri;
pub use value::{NodeId, Value};
