//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the desired tree. The renderer compares
//! a new tree against the previous one and applies the difference to the
//! host.
//!
//! Every vnode carries a [`ShapeFlags`] mask combining its own kind with the
//! shape of its children, so a single bit test answers questions such as
//! "is this an element with array children".

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::Value;

use super::component::{Component, InstanceId};
use super::host::NodeId;

/// Node category and children shape, as bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShapeFlags(u32);

impl ShapeFlags {
    pub const NONE: ShapeFlags = ShapeFlags(0);
    pub const ELEMENT: ShapeFlags = ShapeFlags(1);
    pub const STATEFUL_COMPONENT: ShapeFlags = ShapeFlags(1 << 2);
    pub const TEXT_CHILDREN: ShapeFlags = ShapeFlags(1 << 3);
    pub const ARRAY_CHILDREN: ShapeFlags = ShapeFlags(1 << 4);
    pub const SLOTS_CHILDREN: ShapeFlags = ShapeFlags(1 << 5);

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(&self, other: ShapeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ShapeFlags {
    type Output = ShapeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ShapeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ShapeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ShapeFlags {
    type Output = ShapeFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        ShapeFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for ShapeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ShapeFlags, &str); 5] = [
            (ShapeFlags::ELEMENT, "ELEMENT"),
            (ShapeFlags::STATEFUL_COMPONENT, "STATEFUL_COMPONENT"),
            (ShapeFlags::TEXT_CHILDREN, "TEXT_CHILDREN"),
            (ShapeFlags::ARRAY_CHILDREN, "ARRAY_CHILDREN"),
            (ShapeFlags::SLOTS_CHILDREN, "SLOTS_CHILDREN"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ShapeFlags({})", set.join(" | "))
    }
}

/// What a vnode stands for.
#[derive(Clone)]
pub enum VNodeKind {
    /// A host element with the given tag.
    Element(Arc<str>),
    /// A host text node; the text is the vnode's text children.
    Text,
    /// A list of children without a wrapper element.
    Fragment,
    Component(Component),
}

impl PartialEq for VNodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Text, VNodeKind::Text) => true,
            (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKind::Element(tag) => write!(f, "<{tag}>"),
            VNodeKind::Text => write!(f, "Text"),
            VNodeKind::Fragment => write!(f, "Fragment"),
            VNodeKind::Component(component) => write!(f, "Component({})", component.name()),
        }
    }
}

impl From<&str> for VNodeKind {
    fn from(tag: &str) -> Self {
        VNodeKind::Element(Arc::from(tag))
    }
}

impl From<String> for VNodeKind {
    fn from(tag: String) -> Self {
        VNodeKind::Element(Arc::from(tag))
    }
}

impl From<Component> for VNodeKind {
    fn from(component: Component) -> Self {
        VNodeKind::Component(component)
    }
}

impl From<&Component> for VNodeKind {
    fn from(component: &Component) -> Self {
        VNodeKind::Component(component.clone())
    }
}

/// Identity of a vnode among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VNodeKey {
    Str(Arc<str>),
    Int(i64),
}

impl VNodeKey {
    /// The key carried by a `key` prop value, if it is a string or integer.
    pub fn from_value(value: &Value) -> Option<VNodeKey> {
        match value {
            Value::Str(s) => Some(VNodeKey::Str(s.clone())),
            Value::Number(n) if n.fract() == 0.0 => Some(VNodeKey::Int(*n as i64)),
            _ => None,
        }
    }
}

impl From<&str> for VNodeKey {
    fn from(key: &str) -> Self {
        VNodeKey::Str(Arc::from(key))
    }
}

impl From<String> for VNodeKey {
    fn from(key: String) -> Self {
        VNodeKey::Str(Arc::from(key))
    }
}

impl From<i64> for VNodeKey {
    fn from(key: i64) -> Self {
        VNodeKey::Int(key)
    }
}

impl From<i32> for VNodeKey {
    fn from(key: i32) -> Self {
        VNodeKey::Int(key.into())
    }
}

impl From<usize> for VNodeKey {
    fn from(key: usize) -> Self {
        VNodeKey::Int(key as i64)
    }
}

impl fmt::Display for VNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKey::Str(s) => write!(f, "{s}"),
            VNodeKey::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<VNodeKey> for Value {
    fn from(key: VNodeKey) -> Self {
        match key {
            VNodeKey::Str(s) => Value::Str(s),
            VNodeKey::Int(i) => Value::from(i),
        }
    }
}

/// Vnode properties. The `key` prop doubles as the vnode key and is never
/// passed to the host.
pub type Props = IndexMap<Arc<str>, Value>;

/// Build [`Props`] from pairs.
pub fn props<K, V, I>(pairs: I) -> Props
where
    K: Into<Arc<str>>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A named slot: produces the vnodes to render in its place.
pub type SlotFn = Arc<dyn Fn() -> Vec<VNode> + Send + Sync>;

/// Named slots passed to a component as its children.
#[derive(Clone, Default)]
pub struct Slots {
    slots: IndexMap<Arc<str>, SlotFn>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot, builder style.
    pub fn with<F>(mut self, name: &str, slot: F) -> Self
    where
        F: Fn() -> Vec<VNode> + Send + Sync + 'static,
    {
        self.slots.insert(Arc::from(name), Arc::new(slot));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SlotFn> {
        self.slots.get(name)
    }

    /// Render a slot, or nothing if it was not provided.
    pub fn render(&self, name: &str) -> Vec<VNode> {
        self.slots.get(name).map(|slot| slot()).unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(|k| k.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}

/// Children of a vnode.
#[derive(Clone, Debug, Default)]
pub enum Children {
    #[default]
    None,
    Text(Arc<str>),
    Nodes(Vec<VNode>),
    Slots(Slots),
}

impl Children {
    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::NONE,
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
            Children::Slots(_) => ShapeFlags::SLOTS_CHILDREN,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(Arc::from(text))
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(Arc::from(text))
    }
}

impl From<VNode> for Children {
    fn from(node: VNode) -> Self {
        Children::Nodes(vec![node])
    }
}

impl From<Vec<VNode>> for Children {
    fn from(nodes: Vec<VNode>) -> Self {
        Children::Nodes(nodes)
    }
}

impl From<Slots> for Children {
    fn from(slots: Slots) -> Self {
        Children::Slots(slots)
    }
}

/// A virtual node.
#[derive(Clone)]
pub struct VNode {
    pub kind: VNodeKind,
    pub props: Props,
    pub children: Children,
    pub key: Option<VNodeKey>,
    pub shape: ShapeFlags,
    /// The host node once mounted. For fragments, the start marker.
    pub el: Option<NodeId>,
    /// The end marker of a mounted fragment.
    pub anchor: Option<NodeId>,
    /// The instance of a mounted component.
    pub component: Option<InstanceId>,
}

impl VNode {
    pub fn new(kind: impl Into<VNodeKind>, props: Props, children: Children) -> Self {
        let kind = kind.into();
        let own = match &kind {
            VNodeKind::Element(_) => ShapeFlags::ELEMENT,
            VNodeKind::Component(_) => ShapeFlags::STATEFUL_COMPONENT,
            VNodeKind::Text | VNodeKind::Fragment => ShapeFlags::NONE,
        };
        let key = props.get("key").and_then(VNodeKey::from_value);

        Self {
            shape: own | children.shape(),
            kind,
            props,
            children,
            key,
            el: None,
            anchor: None,
            component: None,
        }
    }

    /// A host text node.
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::new(VNodeKind::Text, Props::new(), Children::Text(text.into()))
    }

    /// A list of children without a wrapper element.
    pub fn fragment(children: Vec<VNode>) -> Self {
        Self::new(VNodeKind::Fragment, Props::new(), Children::Nodes(children))
    }

    /// Set the key, builder style.
    pub fn with_key(mut self, key: impl Into<VNodeKey>) -> Self {
        let key = key.into();
        self.props.insert(Arc::from("key"), Value::from(key.clone()));
        self.key = Some(key);
        self
    }

    /// Whether `other` can be patched in place of `self`.
    pub fn same_type(&self, other: &VNode) -> bool {
        self.kind == other.kind && self.key == other.key
    }

    pub fn is_component(&self) -> bool {
        self.shape.contains(ShapeFlags::STATEFUL_COMPONENT)
    }

    /// The child vnodes, if the children are an array.
    pub fn child_nodes(&self) -> &[VNode] {
        match &self.children {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("VNode");
        out.field("kind", &self.kind);
        if let Some(key) = &self.key {
            out.field("key", key);
        }
        out.field("shape", &self.shape)
            .field("children", &self.children)
            .field("el", &self.el)
            .finish()
    }
}

impl From<&str> for VNode {
    fn from(text: &str) -> Self {
        VNode::text(text)
    }
}

impl From<String> for VNode {
    fn from(text: String) -> Self {
        VNode::text(text)
    }
}
