//! The host interface.
//!
//! The renderer never touches a concrete node tree. Everything it does to
//! the output goes through [`HostOps`], so the same reconciler can drive a
//! DOM binding, a terminal UI or the in-memory [`MemoryHost`](super::MemoryHost)
//! used by the tests.

use std::fmt;

use serde::Serialize;

use crate::reactive::Value;

/// Handle of a host node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node operations a host provides to the renderer.
pub trait HostOps: Send + Sync + 'static {
    /// Insert `node` into `parent` before `anchor`, or at the end. A node
    /// that is already attached somewhere is moved.
    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>);

    /// Detach `node` from its parent.
    fn remove(&self, node: NodeId);

    fn create_element(&self, tag: &str) -> NodeId;

    fn create_text(&self, text: &str) -> NodeId;

    /// Replace all children of an element with `text`.
    fn set_element_text(&self, node: NodeId, text: &str);

    /// Change the content of a text node.
    fn set_text(&self, node: NodeId, text: &str);

    /// Apply a prop change. `next` is `None` when the prop was removed.
    fn patch_prop(&self, node: NodeId, key: &str, prev: Option<&Value>, next: Option<&Value>);

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
}
