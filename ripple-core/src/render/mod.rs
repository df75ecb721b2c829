//! Rendering
//!
//! Virtual nodes, components and the keyed reconciler that turns changes of
//! a vnode tree into the minimal set of host operations.
//!
//! - [`VNode`] / [`h`]: describe the desired tree.
//! - [`Component`]: a reusable unit with props, state and a render function.
//!   Each mounted component re-renders through its own scheduled effect.
//! - [`Renderer`]: mounts trees into a [`HostOps`] implementation and patches
//!   them on update.
//! - [`MemoryHost`]: an in-memory host that logs every operation.

mod component;
mod h;
mod host;
mod memory;
mod renderer;
mod sequence;
mod vnode;

pub use component::{
    Component, ComponentBuilder, DataFn, InstanceId, RenderContext, RenderFn, SetupFn, SetupRef,
    SetupRefKind, SetupRefs, SetupResult,
};
pub use h::{h, HArgs};
pub use host::{HostOps, NodeId};
pub use memory::{HostOp, MemoryHost};
pub use renderer::Renderer;
pub use sequence::longest_increasing_subsequence;
pub use vnode::{props, Children, Props, ShapeFlags, SlotFn, Slots, VNode, VNodeKey, VNodeKind};
