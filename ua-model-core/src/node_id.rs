use opcua::types::{Identifier, NodeId};

/// Sanitize a browse-name component for use inside a string NodeId.
///
/// `[A-Za-z0-9._-]` are kept, everything else becomes `-`. Instance child
/// ids are derived from this, so changing the policy renames every instance
/// node a client may have bookmarked.
pub fn sanitize_nodeid_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    out
}

/// Render the identifier part of a NodeId without the `ns=..;x=` prefix.
pub fn identifier_path(node_id: &NodeId) -> String {
    match &node_id.identifier {
        Identifier::Numeric(n) => n.to_string(),
        Identifier::String(s) => s.as_ref().to_string(),
        Identifier::Guid(g) => g.to_string(),
        Identifier::ByteString(b) => b.as_base64(),
    }
}

/// Derive an instance child id from its parent.
///
/// Format: `{parent}.{suffix}` in the parent's namespace, e.g.
/// `Demo.BoilerDemo.Boiler1.FillLevelSensor`.
pub fn child_node_id(parent: &NodeId, suffix: &str) -> NodeId {
    NodeId::new(
        parent.namespace,
        format!(
            "{}.{}",
            identifier_path(parent),
            sanitize_nodeid_component(suffix)
        ),
    )
}
