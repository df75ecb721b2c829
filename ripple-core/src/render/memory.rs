//! In-memory host
//!
//! [`MemoryHost`] keeps a node tree in an arena and logs every operation the
//! renderer performs as a [`HostOp`]. The log is what tests assert on: how
//! many nodes were created, moved or removed by an update, and in what order.
//!
//! Inserting a node that is already attached is logged as a
//! [`HostOp::Move`], so keyed reorders can be counted directly.

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::reactive::Value;

use super::host::{HostOps, NodeId};

/// One operation performed on a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement {
        node: NodeId,
        tag: String,
    },
    CreateText {
        node: NodeId,
        text: String,
    },
    /// A detached node was attached.
    Insert {
        node: NodeId,
        parent: NodeId,
        anchor: Option<NodeId>,
    },
    /// An attached node was re-attached.
    Move {
        node: NodeId,
        parent: NodeId,
        anchor: Option<NodeId>,
    },
    Remove {
        node: NodeId,
    },
    SetElementText {
        node: NodeId,
        text: String,
    },
    SetText {
        node: NodeId,
        text: String,
    },
    PatchProp {
        node: NodeId,
        key: String,
        prev: Option<serde_json::Value>,
        next: Option<serde_json::Value>,
    },
}

impl HostOp {
    pub fn is_move(&self) -> bool {
        matches!(self, HostOp::Move { .. })
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, HostOp::Insert { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, HostOp::Remove { .. })
    }

    pub fn is_create(&self) -> bool {
        matches!(self, HostOp::CreateElement { .. } | HostOp::CreateText { .. })
    }
}

#[derive(Debug)]
enum NodeData {
    Element { tag: String, props: IndexMap<String, Value> },
    Text(String),
}

#[derive(Debug)]
struct HostNode {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<NodeId, HostNode>,
    next_id: u64,
    log: Vec<HostOp>,
}

impl Tree {
    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            HostNode {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|&child| child != node);
        }
        true
    }

    /// Drop `node` and its subtree from the arena. The node must be detached.
    fn free(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if let Some(freed) = self.nodes.remove(&id) {
                pending.extend(freed.children);
            }
        }
    }

    fn attach(&mut self, node: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            tracing::warn!(?parent, "insert into unknown node");
            return;
        };
        let position = anchor
            .and_then(|anchor| parent_node.children.iter().position(|&c| c == anchor))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(position, node);
        if let Some(node) = self.nodes.get_mut(&node) {
            node.parent = Some(parent);
        }
    }

    fn serialize_into(&self, node: NodeId, out: &mut String) {
        let Some(host_node) = self.nodes.get(&node) else {
            return;
        };
        match &host_node.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { tag, props } => {
                let _ = write!(out, "<{tag}");
                for (key, value) in props {
                    if !value.is_null() {
                        let _ = write!(out, " {key}=\"{value}\"");
                    }
                }
                out.push('>');
                for &child in &host_node.children {
                    self.serialize_into(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn text_into(&self, node: NodeId, out: &mut String) {
        let Some(host_node) = self.nodes.get(&node) else {
            return;
        };
        match &host_node.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for &child in &host_node.children {
                    self.text_into(child, out);
                }
            }
        }
    }
}

/// A host that renders into an in-memory tree.
///
/// # Example
///
/// ```rust
/// use ripple_core::render::{h, MemoryHost, Renderer};
/// use ripple_core::Runtime;
///
/// let renderer = Renderer::new(Runtime::new(), MemoryHost::new());
/// let root = renderer.host().create_root();
///
/// renderer.render(h("p", "hello"), root);
/// assert_eq!(renderer.host().serialize(root), "<root><p>hello</p></root>");
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    tree: Mutex<Tree>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `<root>` element to render into. Not logged.
    pub fn create_root(&self) -> NodeId {
        self.tree.lock().alloc(NodeData::Element {
            tag: "root".to_string(),
            props: IndexMap::new(),
        })
    }

    /// Return and clear the operation log.
    pub fn take_log(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.lock().log)
    }

    pub fn clear_log(&self) {
        self.tree.lock().log.clear();
    }

    /// The operation log as JSON.
    pub fn log_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.tree.lock().log).unwrap_or_default()
    }

    /// Markup of `node` and its subtree.
    pub fn serialize(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.tree.lock().serialize_into(node, &mut out);
        out
    }

    /// Concatenated text of `node`'s subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.tree.lock().text_into(node, &mut out);
        out
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Tag of an element, `None` for text nodes.
    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            NodeData::Text(_) => None,
        }
    }

    pub fn prop(&self, node: NodeId, key: &str) -> Option<Value> {
        match &self.tree.lock().nodes.get(&node)?.data {
            NodeData::Element { props, .. } => props.get(key).cloned(),
            NodeData::Text(_) => None,
        }
    }

    /// Number of live nodes, including the roots. Removed subtrees are freed.
    pub fn node_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    fn log(tree: &mut Tree, op: HostOp) {
        tracing::trace!(?op, "host op");
        tree.log.push(op);
    }
}

impl HostOps for MemoryHost {
    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        let mut tree = self.tree.lock();
        let moved = tree.detach(node);
        tree.attach(node, parent, anchor);
        let op = if moved {
            HostOp::Move { node, parent, anchor }
        } else {
            HostOp::Insert { node, parent, anchor }
        };
        Self::log(&mut tree, op);
    }

    fn remove(&self, node: NodeId) {
        let mut tree = self.tree.lock();
        tree.detach(node);
        tree.free(node);
        Self::log(&mut tree, HostOp::Remove { node });
    }

    fn create_element(&self, tag: &str) -> NodeId {
        let mut tree = self.tree.lock();
        let node = tree.alloc(NodeData::Element {
            tag: tag.to_string(),
            props: IndexMap::new(),
        });
        Self::log(
            &mut tree,
            HostOp::CreateElement {
                node,
                tag: tag.to_string(),
            },
        );
        node
    }

    fn create_text(&self, text: &str) -> NodeId {
        let mut tree = self.tree.lock();
        let node = tree.alloc(NodeData::Text(text.to_string()));
        Self::log(
            &mut tree,
            HostOp::CreateText {
                node,
                text: text.to_string(),
            },
        );
        node
    }

    fn set_element_text(&self, node: NodeId, text: &str) {
        let mut tree = self.tree.lock();
        let children = tree
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            tree.detach(child);
            tree.free(child);
        }
        if !text.is_empty() {
            let child = tree.alloc(NodeData::Text(text.to_string()));
            tree.attach(child, node, None);
        }
        Self::log(
            &mut tree,
            HostOp::SetElementText {
                node,
                text: text.to_string(),
            },
        );
    }

    fn set_text(&self, node: NodeId, text: &str) {
        let mut tree = self.tree.lock();
        if let Some(HostNode {
            data: NodeData::Text(content),
            ..
        }) = tree.nodes.get_mut(&node)
        {
            *content = text.to_string();
        }
        Self::log(
            &mut tree,
            HostOp::SetText {
                node,
                text: text.to_string(),
            },
        );
    }

    fn patch_prop(&self, node: NodeId, key: &str, prev: Option<&Value>, next: Option<&Value>) {
        let mut tree = self.tree.lock();
        if let Some(HostNode {
            data: NodeData::Element { props, .. },
            ..
        }) = tree.nodes.get_mut(&node)
        {
            match next {
                Some(value) => {
                    props.insert(key.to_string(), value.clone());
                }
                None => {
                    props.shift_remove(key);
                }
            }
        }
        Self::log(
            &mut tree,
            HostOp::PatchProp {
                node,
                key: key.to_string(),
                prev: prev.map(Value::to_json),
                next: next.map(Value::to_json),
            },
        );
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.tree.lock();
        let parent = tree.nodes.get(&node)?.parent?;
        let siblings = &tree.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_anchor_and_move() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");

        host.insert(a, root, None);
        host.insert(c, root, None);
        host.insert(b, root, Some(c));
        assert_eq!(host.text_content(root), "abc");
        assert_eq!(host.next_sibling(a), Some(b));

        host.insert(a, root, None);
        assert_eq!(host.text_content(root), "bca");

        let log = host.take_log();
        assert_eq!(log.iter().filter(|op| op.is_insert()).count(), 3);
        assert_eq!(log.iter().filter(|op| op.is_move()).count(), 1);
        assert!(host.take_log().is_empty());
    }

    #[test]
    fn element_text_and_props() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let div = host.create_element("div");
        host.insert(div, root, None);
        host.patch_prop(div, "id", None, Some(&Value::from("main")));
        host.set_element_text(div, "hi");

        assert_eq!(host.serialize(root), "<root><div id=\"main\">hi</div></root>");
        assert_eq!(host.prop(div, "id"), Some(Value::from("main")));

        host.patch_prop(div, "id", Some(&Value::from("main")), None);
        host.set_element_text(div, "");
        assert_eq!(host.serialize(root), "<root><div></div></root>");
    }

    #[test]
    fn log_serializes_with_op_tag() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let node = host.create_text("x");
        host.insert(node, root, None);
        host.remove(node);

        let json = host.log_json();
        assert_eq!(json[0]["op"], "create_text");
        assert_eq!(json[1]["op"], "insert");
        assert_eq!(json[1]["parent"], root.0);
        assert_eq!(json[2]["op"], "remove");
        assert_eq!(host.parent_node(node), None);
    }

    #[test]
    fn removed_subtree_is_freed() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let list = host.create_element("ul");
        host.insert(list, root, None);
        for text in ["a", "b"] {
            let item = host.create_element("li");
            host.set_element_text(item, text);
            host.insert(item, list, None);
        }
        assert_eq!(host.node_count(), 6);

        host.set_element_text(root, "");
        host.take_log();
        let kept = host.create_text("kept");
        host.insert(kept, root, None);
        host.remove(kept);

        assert_eq!(host.node_count(), 1);
        assert!(host.take_log().iter().any(HostOp::is_remove));
    }
}
