//! The Renderer
//!
//! [`Renderer`] mounts vnode trees into a host and brings an existing host
//! tree up to date with a new vnode tree by patching the difference.
//!
//! # Patching
//!
//! `patch(old, new)` mounts when there is no old node, and replaces the old
//! node when the two are not the same type (kind and key). Otherwise it
//! updates in place: text content, element props and children, fragment
//! children, or the component instance.
//!
//! # Keyed Children
//!
//! Two child arrays are reconciled in five steps:
//!
//! 1. Patch the common prefix.
//! 2. Patch the common suffix.
//! 3. If only new nodes remain, mount them before the node after the range.
//! 4. If only old nodes remain, unmount them.
//! 5. Otherwise match the remaining old nodes to new ones by key (unkeyed
//!    nodes by type), patch matches and unmount the rest. If the matches are
//!    out of order, the longest increasing subsequence of their old positions
//!    stays where it is and every other node is moved. Unmatched new nodes are
//!    mounted in the same backward walk.
//!
//! The result is the minimal number of moves for the matched nodes.
//!
//! # Components
//!
//! Every component instance owns a lazy update effect whose scheduler queues
//! a job ordered by the instance id, so parents re-render before children in
//! a flush. When a parent re-render passes new props, the child is updated
//! synchronously and its queued job is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::reactive::{EffectOptions, Runtime};
use crate::scheduler::Job;

use super::component::{apply_pending, should_update_component, ComponentInstance, InstanceId, PendingProps};
use super::host::{HostOps, NodeId};
use super::sequence::longest_increasing_subsequence;
use super::vnode::{Children, Props, VNode, VNodeKey, VNodeKind};

type InstanceHandle = Arc<Mutex<ComponentInstance>>;

struct RendererInner<H: HostOps> {
    host: H,
    runtime: Runtime,
    /// Last tree rendered into each container.
    roots: Mutex<HashMap<NodeId, VNode>>,
    instances: Mutex<HashMap<InstanceId, InstanceHandle>>,
    this: Weak<RendererInner<H>>,
}

/// Renders vnode trees into a host.
///
/// # Example
///
/// ```rust
/// use ripple_core::render::{h, MemoryHost, Renderer, VNode};
/// use ripple_core::Runtime;
///
/// let renderer = Renderer::new(Runtime::new(), MemoryHost::new());
/// let root = renderer.host().create_root();
///
/// let list = |keys: &[&str]| {
///     h("ul", keys.iter().map(|k| h("li", *k).with_key(*k)).collect::<Vec<VNode>>())
/// };
///
/// renderer.render(list(&["a", "b", "c"]), root);
/// renderer.host().clear_log();
///
/// renderer.render(list(&["c", "a", "b"]), root);
/// let moves = renderer.host().take_log().iter().filter(|op| op.is_move()).count();
/// assert_eq!(moves, 1);
/// assert_eq!(renderer.host().text_content(root), "cab");
/// ```
pub struct Renderer<H: HostOps> {
    inner: Arc<RendererInner<H>>,
}

impl<H: HostOps> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: HostOps> Renderer<H> {
    pub fn new(runtime: Runtime, host: H) -> Self {
        let inner = Arc::new_cyclic(|this| RendererInner {
            host,
            runtime,
            roots: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Render `vnode` into `container`, patching whatever was rendered there
    /// before. `None` unmounts the previous tree.
    pub fn render(&self, vnode: impl Into<Option<VNode>>, container: NodeId) {
        let inner = &self.inner;
        let old = inner.roots.lock().remove(&container);
        match vnode.into() {
            Some(mut vnode) => {
                inner.patch(old, &mut vnode, container, None);
                inner.roots.lock().insert(container, vnode);
            }
            None => {
                if let Some(old) = old {
                    inner.unmount(old, true);
                }
            }
        }
    }

    /// Unmount the tree rendered into `container`.
    pub fn unmount(&self, container: NodeId) {
        self.render(None, container);
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Number of mounted component instances.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.lock().len()
    }
}

impl<H: HostOps> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.lock().len())
            .field("instances", &self.inner.instances.lock().len())
            .finish()
    }
}

impl<H: HostOps> Drop for RendererInner<H> {
    fn drop(&mut self) {
        let instances: Vec<InstanceHandle> = self.instances.get_mut().drain().map(|(_, h)| h).collect();
        for handle in instances {
            let (job, effect) = {
                let mut inst = handle.lock();
                (inst.job.take(), inst.effect.take())
            };
            if let Some(job) = job {
                job.deactivate();
            }
            if let Some(effect) = effect {
                effect.stop();
            }
        }
    }
}

impl<H: HostOps> RendererInner<H> {
    // ------------------------------------------------------------------------
    // Patch
    // ------------------------------------------------------------------------

    fn patch(&self, old: Option<VNode>, new: &mut VNode, container: NodeId, anchor: Option<NodeId>) {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if !old.same_type(new) => {
                anchor = self.next_host_node(&old);
                self.unmount(old, true);
                None
            }
            old => old,
        };

        match new.kind {
            VNodeKind::Text => self.process_text(old, new, container, anchor),
            VNodeKind::Fragment => self.process_fragment(old, new, container, anchor),
            VNodeKind::Element(_) => match old {
                Some(old) => self.patch_element(old, new),
                None => self.mount_element(new, container, anchor),
            },
            VNodeKind::Component(_) => match old {
                Some(old) => self.update_component(old, new),
                None => self.mount_component(new, container, anchor),
            },
        }
    }

    fn process_text(&self, old: Option<VNode>, new: &mut VNode, container: NodeId, anchor: Option<NodeId>) {
        let text = new.children.as_text().unwrap_or_default();
        match old {
            None => {
                let el = self.host.create_text(text);
                self.host.insert(el, container, anchor);
                new.el = Some(el);
            }
            Some(old) => {
                if let Some(el) = old.el {
                    if old.children.as_text().unwrap_or_default() != text {
                        self.host.set_text(el, text);
                    }
                }
                new.el = old.el;
            }
        }
    }

    fn process_fragment(&self, old: Option<VNode>, new: &mut VNode, container: NodeId, anchor: Option<NodeId>) {
        match old {
            None => {
                let start = self.host.create_text("");
                let end = self.host.create_text("");
                self.host.insert(start, container, anchor);
                self.host.insert(end, container, anchor);
                new.el = Some(start);
                new.anchor = Some(end);
                if let Children::Nodes(children) = &mut new.children {
                    self.mount_children(children, container, Some(end));
                }
            }
            Some(old) => {
                new.el = old.el;
                new.anchor = old.anchor;
                self.patch_children(old.children, &mut new.children, container, new.anchor);
            }
        }
    }

    fn mount_element(&self, new: &mut VNode, container: NodeId, anchor: Option<NodeId>) {
        let VNodeKind::Element(tag) = &new.kind else {
            return;
        };
        let el = self.host.create_element(tag);
        new.el = Some(el);

        match &mut new.children {
            Children::Text(text) => self.host.set_element_text(el, text),
            Children::Nodes(children) => self.mount_children(children, el, None),
            Children::None | Children::Slots(_) => {}
        }
        for (key, value) in &new.props {
            if key.as_ref() != "key" {
                self.host.patch_prop(el, key, None, Some(value));
            }
        }
        self.host.insert(el, container, anchor);
    }

    fn patch_element(&self, old: VNode, new: &mut VNode) {
        let Some(el) = old.el else {
            tracing::warn!(kind = ?new.kind, "patching an element that was never mounted");
            return;
        };
        new.el = Some(el);
        self.patch_props(el, &old.props, &new.props);
        self.patch_children(old.children, &mut new.children, el, None);
    }

    fn patch_props(&self, el: NodeId, old: &Props, new: &Props) {
        for (key, next) in new {
            if key.as_ref() == "key" {
                continue;
            }
            let prev = old.get(key);
            if prev != Some(next) {
                self.host.patch_prop(el, key, prev, Some(next));
            }
        }
        for (key, prev) in old {
            if key.as_ref() != "key" && !new.contains_key(key) {
                self.host.patch_prop(el, key, Some(prev), None);
            }
        }
    }

    fn mount_children(&self, children: &mut [VNode], container: NodeId, anchor: Option<NodeId>) {
        for child in children {
            self.patch(None, child, container, anchor);
        }
    }

    fn patch_children(&self, old: Children, new: &mut Children, container: NodeId, anchor: Option<NodeId>) {
        match (old, new) {
            (Children::Nodes(old), Children::Nodes(new)) => {
                self.patch_keyed_children(old, new, container, anchor);
            }
            (old, Children::Text(text)) => {
                let unchanged = old.as_text() == Some(&**text);
                if let Children::Nodes(old) = old {
                    self.unmount_children(old);
                }
                if !unchanged {
                    self.host.set_element_text(container, text);
                }
            }
            (Children::Nodes(old), _) => self.unmount_children(old),
            (old, new) => {
                if old.as_text().is_some() {
                    self.host.set_element_text(container, "");
                }
                if let Children::Nodes(new) = new {
                    self.mount_children(new, container, anchor);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Keyed children
    // ------------------------------------------------------------------------

    fn patch_keyed_children(
        &self,
        old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeId,
        parent_anchor: Option<NodeId>,
    ) {
        let new_len = new.len();
        let mut old: Vec<Option<VNode>> = old.into_iter().map(Some).collect();
        let mut i = 0usize;
        let mut e1 = old.len() as isize - 1;
        let mut e2 = new_len as isize - 1;

        // 1. common prefix
        while (i as isize) <= e1 && (i as isize) <= e2 {
            if !matches!(&old[i], Some(prev) if prev.same_type(&new[i])) {
                break;
            }
            let prev = old[i].take();
            self.patch(prev, &mut new[i], container, None);
            i += 1;
        }

        // 2. common suffix
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let (o, n) = (e1 as usize, e2 as usize);
            if !matches!(&old[o], Some(prev) if prev.same_type(&new[n])) {
                break;
            }
            let prev = old[o].take();
            self.patch(prev, &mut new[n], container, None);
            e1 -= 1;
            e2 -= 1;
        }

        if (i as isize) > e1 {
            // 3. only new nodes left
            if (i as isize) <= e2 {
                let end = e2 as usize;
                let anchor = if end + 1 < new_len {
                    self.first_host_node(&new[end + 1])
                } else {
                    parent_anchor
                };
                for node in &mut new[i..=end] {
                    self.patch(None, node, container, anchor);
                }
            }
        } else if (i as isize) > e2 {
            // 4. only old nodes left
            for prev in old[i..=e1 as usize].iter_mut().filter_map(Option::take) {
                self.unmount(prev, true);
            }
        } else {
            // 5. unknown sequence
            self.patch_unknown_sequence(&mut old, new, i, e1 as usize, e2 as usize, container, parent_anchor);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn patch_unknown_sequence(
        &self,
        old: &mut [Option<VNode>],
        new: &mut [VNode],
        start: usize,
        e1: usize,
        e2: usize,
        container: NodeId,
        parent_anchor: Option<NodeId>,
    ) {
        let mut key_to_new_index: HashMap<VNodeKey, usize> = HashMap::new();
        for (index, node) in new.iter().enumerate().take(e2 + 1).skip(start) {
            if let Some(key) = &node.key {
                if key_to_new_index.contains_key(key) {
                    tracing::warn!(%key, "duplicate keys found during update; only the first is matched");
                } else {
                    key_to_new_index.insert(key.clone(), index);
                }
            }
        }

        let to_be_patched = e2 - start + 1;
        let mut patched = 0usize;
        let mut moved = false;
        let mut max_new_index_so_far = 0usize;
        // new position - start -> old position + 1; 0 means mount fresh
        let mut new_index_to_old_index = vec![0usize; to_be_patched];

        for old_index in start..=e1 {
            let Some(prev) = old[old_index].take() else {
                continue;
            };
            if patched >= to_be_patched {
                self.unmount(prev, true);
                continue;
            }

            let new_index = match &prev.key {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (start..=e2)
                    .find(|&j| new_index_to_old_index[j - start] == 0 && prev.same_type(&new[j])),
            };
            match new_index {
                Some(j) if new_index_to_old_index[j - start] == 0 => {
                    new_index_to_old_index[j - start] = old_index + 1;
                    if j >= max_new_index_so_far {
                        max_new_index_so_far = j;
                    } else {
                        moved = true;
                    }
                    self.patch(Some(prev), &mut new[j], container, None);
                    patched += 1;
                }
                _ => self.unmount(prev, true),
            }
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_index_to_old_index)
        } else {
            Vec::new()
        };
        let mut remaining = stable.len();
        let mut moves = 0usize;
        for offset in (0..to_be_patched).rev() {
            let index = start + offset;
            let anchor = if index + 1 < new.len() {
                self.first_host_node(&new[index + 1])
            } else {
                parent_anchor
            };
            if new_index_to_old_index[offset] == 0 {
                self.patch(None, &mut new[index], container, anchor);
            } else if moved {
                if remaining > 0 && stable[remaining - 1] == offset {
                    remaining -= 1;
                } else {
                    self.move_vnode(&new[index], container, anchor);
                    moves += 1;
                }
            }
        }

        tracing::debug!(patched, mounted = to_be_patched - patched, moves, "keyed children reconciled");
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    fn instance(&self, id: InstanceId) -> Option<InstanceHandle> {
        self.instances.lock().get(&id).cloned()
    }

    fn mount_component(&self, new: &mut VNode, container: NodeId, anchor: Option<NodeId>) {
        let VNodeKind::Component(component) = &new.kind else {
            return;
        };
        let instance = ComponentInstance::create(&self.runtime, component, new, container, anchor);
        let id = instance.id;
        new.component = Some(id);
        let handle = Arc::new(Mutex::new(instance));
        self.instances.lock().insert(id, handle.clone());

        let job = {
            let this = self.this.clone();
            Job::with_order(id.raw(), move || {
                if let Some(renderer) = this.upgrade() {
                    renderer.run_update_job(id);
                }
            })
        };
        let options = {
            let (runtime, job) = (self.runtime.downgrade(), job.clone());
            EffectOptions {
                lazy: true,
                ..EffectOptions::with_scheduler(move || {
                    if let Some(rt) = runtime.upgrade() {
                        rt.queue_job(&job);
                    }
                })
            }
        };
        let effect = {
            let this = self.this.clone();
            self.runtime.effect_with(
                move || {
                    if let Some(renderer) = this.upgrade() {
                        renderer.update_instance(id);
                    }
                },
                options,
            )
        };

        {
            let mut inst = handle.lock();
            inst.effect = Some(effect.clone());
            inst.job = Some(job);
        }
        effect.run();
    }

    /// The scheduled update: re-render if anything the last render read has
    /// really changed.
    fn run_update_job(&self, id: InstanceId) {
        let effect = self.instance(id).and_then(|handle| handle.lock().effect.clone());
        if let Some(effect) = effect {
            if effect.is_dirty() {
                effect.run();
            }
        }
    }

    /// Body of an instance's update effect: render and patch the result
    /// against the previous sub-tree.
    fn update_instance(&self, id: InstanceId) {
        let Some(handle) = self.instance(id) else {
            return;
        };
        apply_pending(&handle);

        let (ctx, render, mounted, container, anchor) = {
            let inst = handle.lock();
            (
                inst.context(&self.runtime),
                inst.render.clone(),
                inst.is_mounted,
                inst.container,
                inst.anchor,
            )
        };
        let Some(render) = render else {
            return;
        };

        let mut tree = render(&ctx);
        let prev = handle.lock().sub_tree.take();
        let (container, anchor) = match &prev {
            Some(prev) => (
                self.first_host_node(prev)
                    .and_then(|el| self.host.parent_node(el))
                    .unwrap_or(container),
                self.next_host_node(prev),
            ),
            None => (container, anchor),
        };
        self.patch(prev, &mut tree, container, anchor);

        {
            let mut inst = handle.lock();
            inst.sub_tree = Some(tree);
            inst.is_mounted = true;
        }
        if mounted {
            tracing::debug!(instance = id.raw(), "component updated");
        } else {
            tracing::debug!(instance = id.raw(), "component mounted");
        }
    }

    fn update_component(&self, old: VNode, new: &mut VNode) {
        let Some(id) = old.component else {
            return;
        };
        new.component = Some(id);
        if !should_update_component(&old, new) {
            return;
        }
        let Some(handle) = self.instance(id) else {
            return;
        };

        let slots = match &new.children {
            Children::Slots(slots) => Some(slots.clone()),
            _ => None,
        };
        let (effect, job) = {
            let mut inst = handle.lock();
            inst.next = Some(PendingProps {
                props: new.props.clone(),
                slots,
            });
            (inst.effect.clone(), inst.job.clone())
        };
        // The parent re-render updates the child now; a queued run would be
        // redundant.
        if let Some(job) = &job {
            self.runtime.invalidate_job(job);
        }
        if let Some(effect) = effect {
            effect.mark_dirty();
            effect.run();
        }
    }

    fn unmount_component(&self, id: InstanceId, do_remove: bool) {
        let Some(handle) = self.instances.lock().remove(&id) else {
            return;
        };
        let (effect, job, sub_tree) = {
            let mut inst = handle.lock();
            (inst.effect.take(), inst.job.take(), inst.sub_tree.take())
        };
        if let Some(job) = job {
            job.deactivate();
            self.runtime.invalidate_job(&job);
        }
        if let Some(effect) = effect {
            effect.stop();
        }
        if let Some(tree) = sub_tree {
            self.unmount(tree, do_remove);
        }
        tracing::debug!(instance = id.raw(), "component unmounted");
    }

    // ------------------------------------------------------------------------
    // Unmount and host node lookup
    // ------------------------------------------------------------------------

    fn unmount(&self, vnode: VNode, do_remove: bool) {
        match vnode.kind {
            VNodeKind::Component(_) => {
                if let Some(id) = vnode.component {
                    self.unmount_component(id, do_remove);
                }
            }
            VNodeKind::Fragment => {
                if let Children::Nodes(children) = vnode.children {
                    for child in children {
                        self.unmount(child, do_remove);
                    }
                }
                if do_remove {
                    for marker in [vnode.el, vnode.anchor].into_iter().flatten() {
                        self.host.remove(marker);
                    }
                }
            }
            VNodeKind::Element(_) => {
                // Descendants go with the element; only components need
                // their own teardown.
                if let Children::Nodes(children) = vnode.children {
                    for child in children {
                        self.unmount(child, false);
                    }
                }
                if let (true, Some(el)) = (do_remove, vnode.el) {
                    self.host.remove(el);
                }
            }
            VNodeKind::Text => {
                if let (true, Some(el)) = (do_remove, vnode.el) {
                    self.host.remove(el);
                }
            }
        }
    }

    fn unmount_children(&self, children: Vec<VNode>) {
        for child in children {
            self.unmount(child, true);
        }
    }

    /// The first host node of a mounted vnode.
    fn first_host_node(&self, vnode: &VNode) -> Option<NodeId> {
        match vnode.kind {
            VNodeKind::Component(_) => {
                let handle = self.instance(vnode.component?)?;
                let inst = handle.lock();
                inst.sub_tree.as_ref().and_then(|tree| self.first_host_node(tree))
            }
            _ => vnode.el,
        }
    }

    /// The host node right after a mounted vnode.
    fn next_host_node(&self, vnode: &VNode) -> Option<NodeId> {
        match vnode.kind {
            VNodeKind::Component(_) => {
                let handle = self.instance(vnode.component?)?;
                let inst = handle.lock();
                inst.sub_tree.as_ref().and_then(|tree| self.next_host_node(tree))
            }
            _ => self.host.next_sibling(vnode.anchor.or(vnode.el)?),
        }
    }

    fn move_vnode(&self, vnode: &VNode, container: NodeId, anchor: Option<NodeId>) {
        match vnode.kind {
            VNodeKind::Component(_) => {
                let Some(handle) = vnode.component.and_then(|id| self.instance(id)) else {
                    return;
                };
                let inst = handle.lock();
                if let Some(tree) = &inst.sub_tree {
                    self.move_vnode(tree, container, anchor);
                }
            }
            VNodeKind::Fragment => {
                if let Some(start) = vnode.el {
                    self.host.insert(start, container, anchor);
                }
                for child in vnode.child_nodes() {
                    self.move_vnode(child, container, anchor);
                }
                if let Some(end) = vnode.anchor {
                    self.host.insert(end, container, anchor);
                }
            }
            _ => {
                if let Some(el) = vnode.el {
                    self.host.insert(el, container, anchor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{h, props, HostOp, MemoryHost};

    fn keyed(keys: &[i32]) -> VNode {
        h(
            "ul",
            keys.iter()
                .map(|k| h("li", k.to_string()).with_key(*k))
                .collect::<Vec<_>>(),
        )
    }

    fn setup() -> (Renderer<MemoryHost>, NodeId) {
        let renderer = Renderer::new(Runtime::new(), MemoryHost::new());
        let root = renderer.host().create_root();
        (renderer, root)
    }

    fn count(log: &[HostOp], pred: fn(&HostOp) -> bool) -> usize {
        log.iter().filter(|op| pred(op)).count()
    }

    #[test]
    fn mounts_element_with_props_and_children() {
        let (renderer, root) = setup();
        renderer.render(
            h("div", (props([("id", "app")]), vec![h("span", "a"), VNode::text("b")])),
            root,
        );
        assert_eq!(
            renderer.host().serialize(root),
            "<root><div id=\"app\"><span>a</span>b</div></root>"
        );
    }

    #[test]
    fn patches_text_and_props_in_place() {
        let (renderer, root) = setup();
        renderer.render(h("p", (props([("class", "a"), ("title", "t")]), "one")), root);
        renderer.host().clear_log();

        renderer.render(h("p", (props([("class", "b")]), "two")), root);
        let log = renderer.host().take_log();

        assert_eq!(count(&log, HostOp::is_create), 0);
        assert_eq!(renderer.host().serialize(root), "<root><p class=\"b\">two</p></root>");
        assert!(log.iter().any(|op| matches!(op, HostOp::PatchProp { key, next: None, .. } if key == "title")));
    }

    #[test]
    fn different_type_replaces_in_position() {
        let (renderer, root) = setup();
        renderer.render(h("div", vec![h("a", ()), h("b", ()), h("c", ())]), root);
        renderer.render(h("div", vec![h("a", ()), h("i", ()), h("c", ())]), root);
        assert_eq!(
            renderer.host().serialize(root),
            "<root><div><a></a><i></i><c></c></div></root>"
        );
    }

    #[test]
    fn keyed_move_uses_one_insert() {
        let (renderer, root) = setup();
        renderer.render(keyed(&[1, 2, 3, 4, 5]), root);
        renderer.host().clear_log();

        renderer.render(keyed(&[1, 3, 4, 2, 5]), root);
        let log = renderer.host().take_log();

        assert_eq!(count(&log, HostOp::is_move), 1);
        assert_eq!(count(&log, HostOp::is_create), 0);
        assert_eq!(renderer.host().text_content(root), "13425");
    }

    #[test]
    fn keyed_append_and_removal() {
        let (renderer, root) = setup();
        renderer.render(keyed(&[1, 2]), root);
        renderer.host().clear_log();

        renderer.render(keyed(&[1, 2, 3]), root);
        let log = renderer.host().take_log();
        assert_eq!(count(&log, HostOp::is_move), 0);
        assert_eq!(count(&log, HostOp::is_insert), 1);
        assert_eq!(renderer.host().text_content(root), "123");

        renderer.render(keyed(&[2]), root);
        let log = renderer.host().take_log();
        assert_eq!(count(&log, HostOp::is_remove), 2);
        assert_eq!(renderer.host().text_content(root), "2");
    }

    #[test]
    fn keyed_mixed_update() {
        let (renderer, root) = setup();
        renderer.render(keyed(&[1, 2, 3, 4, 5, 6]), root);
        renderer.host().clear_log();

        renderer.render(keyed(&[1, 5, 3, 7, 2, 6]), root);
        let log = renderer.host().take_log();

        assert_eq!(renderer.host().text_content(root), "153726");
        assert_eq!(count(&log, HostOp::is_remove), 1);
        assert_eq!(count(&log, HostOp::is_insert), 1);
    }

    #[test]
    fn duplicate_keys_do_not_lose_nodes() {
        let (renderer, root) = setup();
        renderer.render(keyed(&[1, 2, 3]), root);
        renderer.render(keyed(&[3, 1, 1, 2]), root);
        assert_eq!(renderer.host().text_content(root), "3112");

        renderer.render(keyed(&[2, 3]), root);
        assert_eq!(renderer.host().text_content(root), "23");
    }

    #[test]
    fn fragment_children_stay_between_markers() {
        let (renderer, root) = setup();
        let tree = |items: Vec<VNode>| h("div", vec![h("b", ()), VNode::fragment(items), h("i", ())]);

        renderer.render(tree(vec![VNode::text("x")]), root);
        renderer.render(tree(vec![VNode::text("x"), VNode::text("y")]), root);
        assert_eq!(renderer.host().serialize(root), "<root><div><b></b>xy<i></i></div></root>");

        renderer.render(h("div", vec![h("b", ()), h("i", ())]), root);
        assert_eq!(renderer.host().serialize(root), "<root><div><b></b><i></i></div></root>");
    }

    #[test]
    fn text_and_array_children_switch() {
        let (renderer, root) = setup();
        renderer.render(h("div", "text"), root);
        renderer.render(h("div", vec![h("span", ())]), root);
        assert_eq!(renderer.host().serialize(root), "<root><div><span></span></div></root>");

        renderer.render(h("div", "again"), root);
        assert_eq!(renderer.host().serialize(root), "<root><div>again</div></root>");

        renderer.render(h("div", ()), root);
        assert_eq!(renderer.host().serialize(root), "<root><div></div></root>");
    }

    #[test]
    fn render_none_unmounts() {
        let (renderer, root) = setup();
        renderer.render(h("div", "x"), root);
        renderer.unmount(root);
        assert_eq!(renderer.host().serialize(root), "<root></root>");
    }
}
