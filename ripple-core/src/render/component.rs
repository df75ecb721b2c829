//! Components
//!
//! A [`Component`] is a reusable definition: the props it declares, an
//! optional `data` factory, an optional `setup` and a render function. Each
//! mount of a component vnode creates an instance that owns the reactive
//! props, the state produced by `data`/`setup`, the last rendered sub-tree
//! and the update effect that re-renders it.
//!
//! Props the component does not declare are collected as attrs. Render
//! functions see props through a readonly view, so a write from inside the
//! component is rejected with a warning instead of silently diverging from
//! what the parent passed.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{Computed, Effect, ObjectRef, Reactive, Ref, RefValue, Runtime, Target, Value};
use crate::scheduler::Job;

use super::host::NodeId;
use super::vnode::{Children, Props, Slots, VNode};

pub use crate::reactive::ids::InstanceId;

/// Produces a component's vnode tree.
pub type RenderFn = Arc<dyn Fn(&RenderContext) -> VNode + Send + Sync>;

/// Runs once per instance, before the first render.
pub type SetupFn = Arc<dyn Fn(&RenderContext) -> SetupResult + Send + Sync>;

/// Creates the initial `data` of an instance.
pub type DataFn = Arc<dyn Fn(&RenderContext) -> Target + Send + Sync>;

/// What `setup` hands back.
pub enum SetupResult {
    /// Use this render function instead of the component's own.
    Render(RenderFn),
    /// State exposed to the render function through [`RenderContext::state`].
    State(Target),
    /// Refs and computeds, read unwrapped through [`RenderContext::setup_ref`].
    Refs(SetupRefs),
    None,
}

impl SetupResult {
    pub fn render<F>(render: F) -> Self
    where
        F: Fn(&RenderContext) -> VNode + Send + Sync + 'static,
    {
        SetupResult::Render(Arc::new(render))
    }

    pub fn refs<I, S>(refs: I) -> Self
    where
        I: IntoIterator<Item = (S, SetupRef)>,
        S: Into<Arc<str>>,
    {
        SetupResult::Refs(refs.into_iter().map(|(name, r)| (name.into(), r)).collect())
    }
}

/// What a [`SetupRef`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupRefKind {
    Ref,
    Computed,
}

/// A ref or computed handed back by `setup`, type-erased to [`Value`].
/// Reading it tracks the underlying source.
#[derive(Clone)]
pub struct SetupRef {
    kind: SetupRefKind,
    read: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl SetupRef {
    pub fn kind(&self) -> SetupRefKind {
        self.kind
    }

    pub fn get(&self) -> Value {
        (self.read)()
    }
}

impl<T> From<Ref<T>> for SetupRef
where
    T: RefValue + Into<Value>,
{
    fn from(source: Ref<T>) -> Self {
        Self {
            kind: SetupRefKind::Ref,
            read: Arc::new(move || source.get().into()),
        }
    }
}

impl<T> From<Computed<T>> for SetupRef
where
    T: RefValue + Into<Value>,
{
    fn from(source: Computed<T>) -> Self {
        Self {
            kind: SetupRefKind::Computed,
            read: Arc::new(move || source.get().into()),
        }
    }
}

impl From<ObjectRef> for SetupRef {
    fn from(source: ObjectRef) -> Self {
        Self {
            kind: SetupRefKind::Ref,
            read: Arc::new(move || source.get()),
        }
    }
}

impl fmt::Debug for SetupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SetupRef").field(&self.kind).finish()
    }
}

/// Named refs returned by `setup`, in the order they were returned.
pub type SetupRefs = IndexMap<Arc<str>, SetupRef>;

impl fmt::Debug for SetupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupResult::Render(_) => write!(f, "Render"),
            SetupResult::State(target) => f.debug_tuple("State").field(target).finish(),
            SetupResult::Refs(refs) => f.debug_tuple("Refs").field(refs).finish(),
            SetupResult::None => write!(f, "None"),
        }
    }
}

struct ComponentDef {
    name: Arc<str>,
    props: Vec<Arc<str>>,
    data: Option<DataFn>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
}

/// A component definition. Cloning shares the definition; two vnodes have
/// the same component type only if they share it.
///
/// # Example
///
/// ```rust
/// use ripple_core::render::{h, props, Component, MemoryHost, Renderer};
/// use ripple_core::{Runtime, Value};
///
/// let greeting = Component::builder("Greeting")
///     .props(["name"])
///     .render(|ctx| h("p", format!("hello {}", ctx.prop("name"))))
///     .build();
///
/// let renderer = Renderer::new(Runtime::new(), MemoryHost::new());
/// let root = renderer.host().create_root();
/// renderer.render(h(&greeting, props([("name", "ripple")])), root);
///
/// assert_eq!(renderer.host().text_content(root), "hello ripple");
/// ```
#[derive(Clone)]
pub struct Component {
    def: Arc<ComponentDef>,
}

impl Component {
    pub fn builder(name: &str) -> ComponentBuilder {
        ComponentBuilder {
            def: ComponentDef {
                name: Arc::from(name),
                props: Vec::new(),
                data: None,
                setup: None,
                render: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Declared prop names.
    pub fn declared_props(&self) -> &[Arc<str>] {
        &self.def.props
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }

    /// Split raw vnode props into declared props and attrs. Declared props
    /// that were not passed are present as `Null`.
    pub(crate) fn split_props(&self, raw: &Props) -> (Props, Props) {
        let mut props: Props = self
            .def
            .props
            .iter()
            .map(|name| (name.clone(), Value::Null))
            .collect();
        let mut attrs = Props::new();
        for (key, value) in raw {
            if key.as_ref() == "key" {
                continue;
            }
            match props.get_mut(key) {
                Some(slot) => *slot = value.clone(),
                None => {
                    attrs.insert(key.clone(), value.clone());
                }
            }
        }
        (props, attrs)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.def.name)
            .field("props", &self.def.props)
            .finish()
    }
}

/// Builder for [`Component`].
pub struct ComponentBuilder {
    def: ComponentDef,
}

impl ComponentBuilder {
    pub fn props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.def.props = names.into_iter().map(Into::into).collect();
        self
    }

    /// Initial state, made reactive and exposed as [`RenderContext::data`].
    pub fn data<F>(mut self, data: F) -> Self
    where
        F: Fn(&RenderContext) -> Target + Send + Sync + 'static,
    {
        self.def.data = Some(Arc::new(data));
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&RenderContext) -> SetupResult + Send + Sync + 'static,
    {
        self.def.setup = Some(Arc::new(setup));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext) -> VNode + Send + Sync + 'static,
    {
        self.def.render = Some(Arc::new(render));
        self
    }

    pub fn build(self) -> Component {
        Component {
            def: Arc::new(self.def),
        }
    }
}

/// What `setup`, `data` and render functions can see of their instance.
#[derive(Clone)]
pub struct RenderContext {
    props: Reactive,
    attrs: Props,
    slots: Slots,
    data: Option<Reactive>,
    state: Option<Reactive>,
    refs: Arc<SetupRefs>,
    runtime: Runtime,
}

impl RenderContext {
    /// Readonly view of the declared props.
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    /// Read one declared prop, tracked.
    pub fn prop(&self, name: &str) -> Value {
        self.props.get(name)
    }

    /// Props passed by the parent that the component does not declare.
    pub fn attrs(&self) -> &Props {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Render a named slot; nothing if the parent did not provide it.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.slots.render(name)
    }

    pub fn data(&self) -> Option<&Reactive> {
        self.data.as_ref()
    }

    /// The state returned by `setup`.
    pub fn state(&self) -> Option<&Reactive> {
        self.state.as_ref()
    }

    /// Read a ref returned by `setup`, unwrapped and tracked. `Null` if
    /// `setup` returned no ref by that name.
    pub fn setup_ref(&self, name: &str) -> Value {
        self.refs.get(name).map(SetupRef::get).unwrap_or_default()
    }

    pub fn is_ref(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn setup_refs(&self) -> &SetupRefs {
        &self.refs
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("attrs", &self.attrs)
            .field("slots", &self.slots)
            .field("has_data", &self.data.is_some())
            .field("has_state", &self.state.is_some())
            .field("refs", &self.refs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// New props and slots from a parent re-render, applied at the start of the
/// child's next update.
pub(crate) struct PendingProps {
    pub(crate) props: Props,
    pub(crate) slots: Option<Slots>,
}

/// A mounted component.
pub(crate) struct ComponentInstance {
    pub(crate) id: InstanceId,
    pub(crate) component: Component,
    /// Writable props; the context only exposes the readonly view.
    pub(crate) props: Reactive,
    pub(crate) attrs: Props,
    pub(crate) slots: Slots,
    pub(crate) data: Option<Reactive>,
    pub(crate) state: Option<Reactive>,
    pub(crate) refs: Arc<SetupRefs>,
    pub(crate) render: Option<RenderFn>,
    pub(crate) sub_tree: Option<VNode>,
    pub(crate) is_mounted: bool,
    pub(crate) next: Option<PendingProps>,
    pub(crate) effect: Option<Effect>,
    pub(crate) job: Option<Job>,
    /// Where the first render is inserted. Later renders resolve their
    /// position from the previous sub-tree.
    pub(crate) container: NodeId,
    pub(crate) anchor: Option<NodeId>,
}

impl ComponentInstance {
    /// Create an instance for `vnode`: split its props, then run `data` and
    /// `setup` without tracking.
    pub(crate) fn create(
        runtime: &Runtime,
        component: &Component,
        vnode: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Self {
        let id = InstanceId::new();
        let (props, attrs) = component.split_props(&vnode.props);
        let slots = match &vnode.children {
            Children::Slots(slots) => slots.clone(),
            _ => Slots::new(),
        };
        let props = runtime.reactive(Target::object_from(props));

        let mut instance = Self {
            id,
            component: component.clone(),
            props,
            attrs,
            slots,
            data: None,
            state: None,
            refs: Arc::default(),
            render: component.def.render.clone(),
            sub_tree: None,
            is_mounted: false,
            next: None,
            effect: None,
            job: None,
            container,
            anchor,
        };

        runtime.untracked(|| {
            if let Some(data) = &component.def.data {
                let target = data(&instance.context(runtime));
                instance.data = Some(runtime.reactive(target));
            }
            if let Some(setup) = &component.def.setup {
                match setup(&instance.context(runtime)) {
                    SetupResult::Render(render) => instance.render = Some(render),
                    SetupResult::State(target) => instance.state = Some(runtime.reactive(target)),
                    SetupResult::Refs(refs) => instance.refs = Arc::new(refs),
                    SetupResult::None => {}
                }
            }
        });

        if instance.render.is_none() {
            tracing::warn!(component = component.name(), "component is missing a render function");
        }
        tracing::debug!(instance = id.raw(), component = component.name(), "component instance created");
        instance
    }

    pub(crate) fn context(&self, runtime: &Runtime) -> RenderContext {
        RenderContext {
            props: self.props.readonly(),
            attrs: self.attrs.clone(),
            slots: self.slots.clone(),
            data: self.data.clone(),
            state: self.state.clone(),
            refs: self.refs.clone(),
            runtime: runtime.clone(),
        }
    }
}

/// Apply props and slots from a parent re-render, if any are pending. Prop
/// writes notify effects and must not happen under the instance lock.
pub(crate) fn apply_pending(instance: &Mutex<ComponentInstance>) {
    let (pending, props_handle, component, id) = {
        let mut inst = instance.lock();
        let Some(pending) = inst.next.take() else {
            return;
        };
        (pending, inst.props.clone(), inst.component.clone(), inst.id)
    };

    let (props, attrs) = component.split_props(&pending.props);
    for (key, value) in props {
        if let Err(err) = props_handle.set(key, value) {
            tracing::warn!(instance = id.raw(), %err, "failed to update prop");
        }
    }

    let mut inst = instance.lock();
    inst.attrs = attrs;
    if let Some(slots) = pending.slots {
        inst.slots = slots;
    }
}

/// Whether a parent re-render must update the child: the shallow props
/// differ, or either vnode carries slots.
pub(crate) fn should_update_component(prev: &VNode, next: &VNode) -> bool {
    let has_slots = |v: &VNode| matches!(v.children, Children::Slots(_));
    if has_slots(prev) || has_slots(next) {
        return true;
    }
    if prev.props.len() != next.props.len() {
        return true;
    }
    next.props
        .iter()
        .any(|(key, value)| prev.props.get(key) != Some(value))
}
