use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::tree::ConfigNode;

/// Content digest of a configuration tree.
///
/// The digest covers structure and values only: whitespace and key order of
/// the source document do not change it, so it is stable across refreshes of
/// an unchanged configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    #[must_use]
    pub fn hash(node: &ConfigNode) -> [u8; 32] {
        let mut hasher = Sha256::new();
        feed(&mut hasher, node);
        hasher.finalize().into()
    }

    #[must_use]
    pub fn hash_hex(node: &ConfigNode) -> String {
        let digest = Self::hash(node);
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(&mut out, "{byte:02x}");
        }
        out
    }
}

/// Hex encoded SHA-256 digest of a configuration tree.
#[must_use]
pub fn content_hash(node: &ConfigNode) -> String {
    ContentHasher::hash_hex(node)
}

// Each value is tagged and length-prefixed so distinct trees never share an
// encoding.
fn feed(hasher: &mut Sha256, node: &ConfigNode) {
    match node {
        ConfigNode::Null => hasher.update([0u8]),
        ConfigNode::Bool(value) => hasher.update([1u8, u8::from(*value)]),
        ConfigNode::Number(value) => feed_bytes(hasher, 2, value.to_string().as_bytes()),
        ConfigNode::String(value) => feed_bytes(hasher, 3, value.as_bytes()),
        ConfigNode::List(items) => {
            hasher.update([4u8]);
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        ConfigNode::Map(entries) => {
            hasher.update([5u8]);
            hasher.update((entries.len() as u64).to_be_bytes());
            for (key, value) in entries {
                feed_bytes(hasher, 3, key.as_bytes());
                feed(hasher, value);
            }
        }
    }
}

fn feed_bytes(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
