//! Renderer tests: keyed reconciliation against the in-memory host and the
//! component lifecycle.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ripple_core::render::{
    h, props, Component, HostOp, MemoryHost, NodeId, Renderer, SetupRef, SetupResult, Slots, VNode,
};
use ripple_core::{Reactive, Ref, Runtime, Target, Value};

fn setup() -> (Runtime, Renderer<MemoryHost>, NodeId) {
    let rt = Runtime::new();
    let renderer = Renderer::new(rt.clone(), MemoryHost::new());
    let root = renderer.host().create_root();
    (rt, renderer, root)
}

fn keyed_list(keys: &[&str]) -> VNode {
    h(
        "ul",
        keys.iter()
            .map(|k| h("li", *k).with_key(*k))
            .collect::<Vec<_>>(),
    )
}

fn count(ops: &[HostOp], pred: fn(&HostOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

fn renders() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let n = Arc::new(AtomicI32::new(0));
    (n.clone(), n)
}

// ----------------------------------------------------------------------------
// Keyed children
// ----------------------------------------------------------------------------

#[test]
fn swapping_two_middle_items_moves_one() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["a", "b", "c", "d"]), root);
    renderer.host().clear_log();

    renderer.render(keyed_list(&["a", "c", "b", "d"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(count(&ops, HostOp::is_move), 1);
    assert_eq!(count(&ops, HostOp::is_create), 0);
    assert_eq!(count(&ops, HostOp::is_remove), 0);
    assert_eq!(renderer.host().text_content(root), "acbd");
}

#[test]
fn appending_mounts_at_the_end_without_moves() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["a", "b"]), root);
    let ul = renderer.host().children(root)[0];
    renderer.host().clear_log();

    renderer.render(keyed_list(&["a", "b", "c"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(count(&ops, HostOp::is_move), 0);
    let inserts: Vec<&HostOp> = ops.iter().filter(|op| op.is_insert()).collect();
    assert_eq!(inserts.len(), 1);
    assert!(matches!(
        inserts[0],
        HostOp::Insert { parent, anchor: None, .. } if *parent == ul
    ));
    assert_eq!(renderer.host().text_content(root), "abc");
}

#[test]
fn prepending_inserts_before_the_first_item() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["b", "c"]), root);
    renderer.host().clear_log();

    renderer.render(keyed_list(&["a", "b", "c"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(count(&ops, HostOp::is_move), 0);
    assert_eq!(count(&ops, HostOp::is_insert), 1);
    assert_eq!(renderer.host().text_content(root), "abc");
}

#[test]
fn reversal_keeps_one_item_in_place() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["a", "b", "c", "d", "e"]), root);
    renderer.host().clear_log();

    renderer.render(keyed_list(&["e", "d", "c", "b", "a"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(count(&ops, HostOp::is_move), 4);
    assert_eq!(count(&ops, HostOp::is_create), 0);
    assert_eq!(renderer.host().text_content(root), "edcba");
}

#[test]
fn removal_from_the_middle() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["a", "b", "c", "d"]), root);
    renderer.host().clear_log();

    renderer.render(keyed_list(&["a", "d"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(count(&ops, HostOp::is_remove), 2);
    assert_eq!(count(&ops, HostOp::is_move), 0);
    assert_eq!(renderer.host().text_content(root), "ad");
}

#[test]
fn mixed_insert_remove_and_move() {
    let (_rt, renderer, root) = setup();
    renderer.render(keyed_list(&["a", "b", "c", "d", "e", "f", "g"]), root);
    renderer.host().clear_log();

    renderer.render(keyed_list(&["a", "c", "e", "b", "h", "g"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(renderer.host().text_content(root), "acebhg");
    assert_eq!(count(&ops, HostOp::is_remove), 2);
    assert_eq!(count(&ops, HostOp::is_create), 1);
    assert_eq!(count(&ops, HostOp::is_move), 1);
}

#[test]
fn host_log_serializes_to_json() {
    let (_rt, renderer, root) = setup();
    renderer.render(h("p", (props([("id", "x")]), "hi")), root);

    let log = renderer.host().log_json();
    assert_eq!(log[0]["op"], "create_element");
    assert_eq!(log[0]["tag"], "p");
    let last = log.as_array().and_then(|ops| ops.last()).cloned().unwrap_or_default();
    assert_eq!(last["op"], "insert");
    assert_eq!(last["parent"], root.0);
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

#[test]
fn component_rerenders_once_per_tick() {
    let (rt, renderer, root) = setup();
    let count_ref = rt.new_ref(0);
    let (render_count, render_count_clone) = renders();

    let counter = {
        let count_ref = count_ref.clone();
        Component::builder("Counter")
            .render(move |_| {
                render_count_clone.fetch_add(1, Ordering::SeqCst);
                h("p", format!("count: {}", count_ref.get()))
            })
            .build()
    };
    renderer.render(h(&counter, ()), root);
    assert_eq!(renderer.host().text_content(root), "count: 0");
    renderer.host().clear_log();

    count_ref.set(1);
    count_ref.set(2);
    assert_eq!(renderer.host().text_content(root), "count: 0");

    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().text_content(root), "count: 2");
    assert_eq!(render_count.load(Ordering::SeqCst), 2);
    assert_eq!(count(&renderer.host().take_log(), HostOp::is_create), 0);
}

#[test]
fn parent_props_update_the_child_once() {
    let (rt, renderer, root) = setup();
    let shared = rt.new_ref(1);
    let (child_renders, child_renders_clone) = renders();

    let child = {
        let shared = shared.clone();
        Component::builder("Child")
            .props(["label"])
            .render(move |ctx| {
                child_renders_clone.fetch_add(1, Ordering::SeqCst);
                h("span", format!("{}/{}", ctx.prop("label"), shared.get()))
            })
            .build()
    };
    let parent = {
        let (shared, child) = (shared.clone(), child.clone());
        Component::builder("Parent")
            .render(move |_| h("div", h(&child, props([("label", shared.get() * 10)]))))
            .build()
    };

    renderer.render(h(&parent, ()), root);
    assert_eq!(renderer.host().text_content(root), "10/1");

    // Both parent and child read `shared`; the parent runs first and updates
    // the child, so the child's own queued update has nothing left to do.
    shared.set(2);
    rt.flush_jobs().unwrap();

    assert_eq!(renderer.host().text_content(root), "20/2");
    assert_eq!(child_renders.load(Ordering::SeqCst), 2);
}

#[test]
fn unchanged_props_skip_the_child() {
    let (rt, renderer, root) = setup();
    let tick = rt.new_ref(0);
    let (child_renders, child_renders_clone) = renders();

    let child = Component::builder("Static")
        .props(["label"])
        .render(move |ctx| {
            child_renders_clone.fetch_add(1, Ordering::SeqCst);
            h("span", ctx.prop("label").to_string())
        })
        .build();
    let parent = {
        let (tick, child) = (tick.clone(), child.clone());
        Component::builder("Parent")
            .render(move |_| {
                h(
                    "div",
                    vec![
                        h("b", tick.get().to_string()),
                        h(&child, props([("label", "fixed")])),
                    ],
                )
            })
            .build()
    };

    renderer.render(h(&parent, ()), root);
    tick.set(1);
    rt.flush_jobs().unwrap();

    assert_eq!(renderer.host().text_content(root), "1fixed");
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);
}

#[test]
fn unmounted_child_releases_its_effect() {
    let (rt, renderer, root) = setup();
    let show = rt.new_ref(true);
    let shared = rt.new_ref(0);

    let child = {
        let shared = shared.clone();
        Component::builder("Child")
            .render(move |_| h("span", shared.get().to_string()))
            .build()
    };
    let parent = {
        let (show, child) = (show.clone(), child.clone());
        Component::builder("Parent")
            .render(move |_| {
                if show.get() {
                    h("div", h(&child, ()))
                } else {
                    h("div", ())
                }
            })
            .build()
    };

    renderer.render(h(&parent, ()), root);
    assert_eq!(renderer.instance_count(), 2);
    assert_eq!(shared.subscriber_count(), 1);

    show.set(false);
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.instance_count(), 1);
    assert_eq!(shared.subscriber_count(), 0);
    assert_eq!(renderer.host().serialize(root), "<root><div></div></root>");

    shared.set(1);
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().serialize(root), "<root><div></div></root>");

    renderer.unmount(root);
    assert_eq!(renderer.instance_count(), 0);
    assert_eq!(show.subscriber_count(), 0);
}

#[test]
fn unmounting_frees_host_nodes() {
    let (_rt, renderer, root) = setup();

    renderer.render(keyed_list(&["a", "b", "c"]), root);
    let mounted = renderer.host().node_count();
    assert!(mounted > 1);

    renderer.render(keyed_list(&["a"]), root);
    assert!(renderer.host().node_count() < mounted);

    renderer.unmount(root);
    assert_eq!(renderer.host().node_count(), 1);
    assert_eq!(renderer.host().serialize(root), "<root></root>");
}

#[test]
fn keyed_components_move_their_subtrees() {
    let (_rt, renderer, root) = setup();
    let (item_renders, item_renders_clone) = renders();
    let item = Component::builder("Item")
        .props(["label"])
        .render(move |ctx| {
            item_renders_clone.fetch_add(1, Ordering::SeqCst);
            h("li", ctx.prop("label").to_string())
        })
        .build();
    let list = |keys: &[&str]| {
        h(
            "ul",
            keys.iter()
                .map(|k| h(&item, props([("label", *k)])).with_key(*k))
                .collect::<Vec<_>>(),
        )
    };

    renderer.render(list(&["a", "b", "c", "d"]), root);
    renderer.host().clear_log();
    renderer.render(list(&["a", "c", "b", "d"]), root);
    let ops = renderer.host().take_log();

    assert_eq!(renderer.host().text_content(root), "acbd");
    assert_eq!(count(&ops, HostOp::is_move), 1);
    assert_eq!(item_renders.load(Ordering::SeqCst), 4);
    assert_eq!(renderer.instance_count(), 4);
}

#[test]
fn setup_can_return_a_render_function() {
    let (rt, renderer, root) = setup();
    let exposed: Arc<Mutex<Option<Ref<i32>>>> = Arc::new(Mutex::new(None));

    let component = {
        let exposed = exposed.clone();
        Component::builder("WithSetup")
            .setup(move |ctx| {
                let clicks = ctx.runtime().new_ref(0);
                *exposed.lock() = Some(clicks.clone());
                SetupResult::render(move |_| h("button", format!("clicked {}", clicks.get())))
            })
            .build()
    };
    renderer.render(h(&component, ()), root);
    assert_eq!(renderer.host().text_content(root), "clicked 0");

    let clicks = exposed.lock().clone().unwrap();
    clicks.set(3);
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().text_content(root), "clicked 3");
}

#[test]
fn render_reads_refs_returned_from_setup() {
    let (rt, renderer, root) = setup();
    let exposed: Arc<Mutex<Option<Ref<i32>>>> = Arc::new(Mutex::new(None));

    let component = {
        let exposed = exposed.clone();
        Component::builder("Counter")
            .setup(move |ctx| {
                let count = ctx.runtime().new_ref(1);
                *exposed.lock() = Some(count.clone());
                let label = {
                    let count = count.clone();
                    ctx.runtime().computed(move || format!("x{}", count.get()))
                };
                SetupResult::refs([("count", SetupRef::from(count)), ("label", SetupRef::from(label))])
            })
            .render(|ctx| h("p", format!("{} {}", ctx.setup_ref("count"), ctx.setup_ref("label"))))
            .build()
    };
    renderer.render(h(&component, ()), root);
    assert_eq!(renderer.host().text_content(root), "1 x1");

    let count = exposed.lock().clone().unwrap();
    count.set(5);
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().text_content(root), "5 x5");
}

#[test]
fn data_and_setup_state_are_reactive() {
    let (rt, renderer, root) = setup();
    let handles: Arc<Mutex<Option<(Reactive, Reactive)>>> = Arc::new(Mutex::new(None));

    let component = {
        let handles = handles.clone();
        Component::builder("Stateful")
            .data(|_| Target::object_from([("count", Value::from(1))]))
            .setup(|_| SetupResult::State(Target::object_from([("label", Value::from("n"))])))
            .render(move |ctx| {
                let (Some(data), Some(state)) = (ctx.data(), ctx.state()) else {
                    return h("p", "missing");
                };
                *handles.lock() = Some((data.clone(), state.clone()));
                h("p", format!("{}={}", state.get("label"), data.get("count")))
            })
            .build()
    };
    renderer.render(h(&component, ()), root);
    assert_eq!(renderer.host().text_content(root), "n=1");

    let (data, state) = handles.lock().clone().unwrap();
    data.set("count", 2).unwrap();
    state.set("label", "m").unwrap();
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().text_content(root), "m=2");
}

#[test]
fn props_attrs_and_slots_reach_the_render_context() {
    let (_rt, renderer, root) = setup();
    let write_rejected = Arc::new(AtomicBool::new(false));

    let card = {
        let write_rejected = write_rejected.clone();
        Component::builder("Card")
            .props(["title"])
            .render(move |ctx| {
                write_rejected.store(ctx.props().set("title", "hacked").is_err(), Ordering::SeqCst);
                let class = ctx.attr("class").cloned().unwrap_or_default();
                let mut children = vec![h("h1", ctx.prop("title").to_string())];
                children.extend(ctx.slot("default"));
                h("section", (props([("class", class)]), children))
            })
            .build()
    };

    renderer.render(
        h(
            &card,
            (
                props([("title", "Hello"), ("class", "card")]),
                Slots::new().with("default", || vec![h("p", "body")]),
            ),
        ),
        root,
    );

    assert!(write_rejected.load(Ordering::SeqCst));
    assert_eq!(
        renderer.host().serialize(root),
        "<root><section class=\"card\"><h1>Hello</h1><p>body</p></section></root>"
    );
}

#[test]
fn component_root_can_change_type() {
    let (rt, renderer, root) = setup();
    let as_link = rt.new_ref(false);

    let component = {
        let as_link = as_link.clone();
        Component::builder("Toggle")
            .render(move |_| if as_link.get() { h("a", "go") } else { h("span", "go") })
            .build()
    };
    renderer.render(h("div", vec![h(&component, ()), h("i", ())]), root);

    as_link.set(true);
    rt.flush_jobs().unwrap();
    assert_eq!(renderer.host().serialize(root), "<root><div><a>go</a><i></i></div></root>");
}

#[tokio::test]
async fn component_updates_on_next_tick() {
    let (rt, renderer, root) = setup();
    let name = rt.new_ref("a".to_string());

    let component = {
        let name = name.clone();
        Component::builder("Name")
            .render(move |_| h("p", name.get()))
            .build()
    };
    renderer.render(h(&component, ()), root);

    name.set("b".to_string());
    rt.next_tick().await.unwrap();
    assert_eq!(renderer.host().text_content(root), "b");
}
