use config_tree_core::{
    content_hash, normalize, parse_str, redact_sensitive, to_canonical_json, ConfigNode,
    ParseError, WriteError,
};

/// Root keys a Kea daemon or agent configuration can carry.
pub const KNOWN_ROOTS: [&str; 5] = ["Dhcp4", "Dhcp6", "Control-agent", "DhcpDdns", "Netconf"];

/// Suffix identifying the High Availability hook library.
pub const HA_HOOK_LIBRARY: &str = "libdhcp_ha.so";

/// Immutable view of one daemon's configuration document.
///
/// The tree is normalized on construction and hashed once; the hash is the
/// identity used for staleness checks and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct KeaConfig {
    tree: ConfigNode,
    hash: String,
}

impl KeaConfig {
    /// Parse and normalize a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(Self::from_node(parse_str(text)?))
    }

    /// Wrap an already built tree, normalizing it first.
    pub fn from_node(node: ConfigNode) -> Self {
        let tree = normalize(&node);
        let hash = content_hash(&tree);
        Self { tree, hash }
    }

    pub fn tree(&self) -> &ConfigNode {
        &self.tree
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Name of the top-level configuration block, e.g. `Dhcp4`.
    ///
    /// Falls back to the only top-level key when the document has a single
    /// map-valued entry with an unknown name.
    pub fn root_name(&self) -> Option<&str> {
        let entries = self.tree.as_map()?;
        if let Some(name) = KNOWN_ROOTS.iter().find(|name| entries.contains_key(**name)) {
            return Some(*name);
        }
        match entries.iter().next() {
            Some((name, ConfigNode::Map(_))) if entries.len() == 1 => Some(name.as_str()),
            _ => None,
        }
    }

    /// Contents of the top-level configuration block.
    pub fn root(&self) -> Option<&ConfigNode> {
        self.root_name().and_then(|name| self.tree.get(name))
    }

    /// Entries of `hooks-libraries`, empty when absent.
    pub fn hooks_libraries(&self) -> &[ConfigNode] {
        self.root_items("hooks-libraries")
    }

    /// Path and parameters of the first hook library whose path ends with
    /// `suffix`.
    pub fn hook_library(&self, suffix: &str) -> Option<(&str, Option<&ConfigNode>)> {
        self.hooks_libraries().iter().find_map(|entry| {
            let library = entry.get_str(&["library"])?;
            library
                .ends_with(suffix)
                .then(|| (library, entry.get("parameters")))
        })
    }

    /// The High Availability hook library, if configured.
    pub fn ha_hook_library(&self) -> Option<(&str, Option<&ConfigNode>)> {
        self.hook_library(HA_HOOK_LIBRARY)
    }

    /// Entries of `loggers`, empty when absent.
    pub fn loggers(&self) -> &[ConfigNode] {
        self.root_items("loggers")
    }

    /// Entries of a list directly under the root block.
    pub fn root_items(&self, key: &str) -> &[ConfigNode] {
        self.root().map(|root| root.items(&[key])).unwrap_or(&[])
    }

    /// Copy of the tree with passwords, secrets and tokens nulled out.
    pub fn redacted(&self) -> ConfigNode {
        redact_sensitive(&self.tree)
    }

    /// Compact JSON with sorted keys, used as the stored form.
    pub fn to_json(&self) -> Result<String, WriteError> {
        to_canonical_json(&self.tree)
    }
}
