//! Hyperscript
//!
//! [`h`] builds vnodes with the overloads of the classic `h(type, ...)`
//! helper. The second argument is resolved by its type:
//!
//! | argument                  | result                      |
//! |---------------------------|-----------------------------|
//! | `()`                      | no props, no children       |
//! | `Props`                   | props only                  |
//! | `VNode`                   | one child                   |
//! | `Vec<VNode>`              | array children              |
//! | `&str` / `String`         | text children               |
//! | `Slots`                   | slot children (components)  |
//! | `(Props, children)`       | both                        |
//!
//! The [`h!`](crate::h) macro adds the variadic form, where every argument
//! after the props becomes one child.

use super::vnode::{Children, Props, Slots, VNode, VNodeKind};

/// Props and children for [`h`].
#[derive(Debug, Default)]
pub struct HArgs {
    pub props: Props,
    pub children: Children,
}

impl From<()> for HArgs {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Props> for HArgs {
    fn from(props: Props) -> Self {
        Self {
            props,
            children: Children::None,
        }
    }
}

impl From<VNode> for HArgs {
    fn from(child: VNode) -> Self {
        Self {
            props: Props::new(),
            children: Children::from(child),
        }
    }
}

impl From<Vec<VNode>> for HArgs {
    fn from(children: Vec<VNode>) -> Self {
        Self {
            props: Props::new(),
            children: Children::from(children),
        }
    }
}

impl From<&str> for HArgs {
    fn from(text: &str) -> Self {
        Self {
            props: Props::new(),
            children: Children::from(text),
        }
    }
}

impl From<String> for HArgs {
    fn from(text: String) -> Self {
        Self {
            props: Props::new(),
            children: Children::from(text),
        }
    }
}

impl From<Slots> for HArgs {
    fn from(slots: Slots) -> Self {
        Self {
            props: Props::new(),
            children: Children::from(slots),
        }
    }
}

impl<C: Into<Children>> From<(Props, C)> for HArgs {
    fn from((props, children): (Props, C)) -> Self {
        Self {
            props,
            children: children.into(),
        }
    }
}

/// Build a vnode.
///
/// ```rust
/// use ripple_core::render::{h, props, ShapeFlags, VNode};
///
/// let list = h("ul", (props([("id", "list")]), vec![h("li", "a"), h("li", "b")]));
/// assert!(list.shape.contains(ShapeFlags::ARRAY_CHILDREN));
/// assert_eq!(list.child_nodes().len(), 2);
/// ```
pub fn h(kind: impl Into<VNodeKind>, args: impl Into<HArgs>) -> VNode {
    let HArgs { props, children } = args.into();
    VNode::new(kind, props, children)
}

/// Build a vnode with [`h`], accepting any number of children.
///
/// ```rust
/// use ripple_core::h;
/// use ripple_core::render::{props, Props};
///
/// let empty = h!("br");
/// let text = h!("p", "hello");
/// let one = h!("div", Props::new(), h!("span"));
/// let many = h!("div", props([("id", "x")]), h!("span"), "text", h!("b"));
///
/// assert!(empty.child_nodes().is_empty());
/// assert_eq!(text.children.as_text(), Some("hello"));
/// assert_eq!(one.child_nodes().len(), 1);
/// assert_eq!(many.child_nodes().len(), 3);
/// ```
#[macro_export]
macro_rules! h {
    ($kind:expr $(,)?) => {
        $crate::render::h($kind, ())
    };
    ($kind:expr, $args:expr $(,)?) => {
        $crate::render::h($kind, $args)
    };
    ($kind:expr, $props:expr, $children:expr $(,)?) => {
        $crate::render::h($kind, ($props, $children))
    };
    ($kind:expr, $props:expr, $($child:expr),+ $(,)?) => {
        $crate::render::h(
            $kind,
            ($props, ::std::vec![$($crate::render::VNode::from($child)),+]),
        )
    };
}
