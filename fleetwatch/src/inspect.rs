use config_tree_core::ConfigNode;

/// Render a configuration tree with a configurable max depth.
///
/// Map entries are shown by key, list items by index, and scalars inline.
pub fn render_tree(node: &ConfigNode, max_depth: usize) -> String {
    let mut out = String::new();
    render_children(node, 0, max_depth, &mut out);
    out
}

fn render_children(node: &ConfigNode, depth: usize, max_depth: usize, out: &mut String) {
    match node {
        ConfigNode::Map(entries) => {
            for (key, child) in entries {
                render_node(key, child, depth, max_depth, out);
            }
        }
        ConfigNode::List(items) => {
            for (index, child) in items.iter().enumerate() {
                render_node(&format!("[{index}]"), child, depth, max_depth, out);
            }
        }
        _ => {}
    }
}

fn render_node(label: &str, node: &ConfigNode, depth: usize, max_depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        ConfigNode::Map(entries) if depth >= max_depth => {
            out.push_str(&format!("{indent}{label} {{{} keys}}\n", entries.len()));
        }
        ConfigNode::List(items) if depth >= max_depth => {
            out.push_str(&format!("{indent}{label} [{} items]\n", items.len()));
        }
        ConfigNode::Map(_) | ConfigNode::List(_) => {
            out.push_str(&format!("{indent}{label}\n"));
            render_children(node, depth + 1, max_depth, out);
        }
        ConfigNode::String(text) => out.push_str(&format!("{indent}{label} = \"{text}\"\n")),
        ConfigNode::Null => out.push_str(&format!("{indent}{label} = null\n")),
        ConfigNode::Bool(value) => out.push_str(&format!("{indent}{label} = {value}\n")),
        ConfigNode::Number(value) => out.push_str(&format!("{indent}{label} = {value}\n")),
    }
}
