//! Generic configuration tree primitives used by higher-level tools.
//!
//! Documents are parsed once into an immutable [`ConfigNode`] tree, normalized
//! by an explicit step, and then only read. Hashing and canonical
//! serialization make it cheap to tell whether two snapshots of a
//! configuration carry the same content.

pub mod hash;
pub mod normalize;
pub mod parser;
pub mod tree;
pub mod writer;

pub use hash::{content_hash, ContentHasher};
pub use normalize::{normalize, redact_sensitive};
pub use parser::{
    expand_includes, parse, parse_file, parse_file_with_includes, parse_str, ParseError,
};
pub use tree::ConfigNode;
pub use writer::{to_canonical_json, to_pretty_json, write, write_file, WriteError};
