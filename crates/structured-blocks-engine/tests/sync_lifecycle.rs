use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use structured_blocks_engine::demo;
use structured_blocks_engine::document::blocks::build_block;
use structured_blocks_engine::{
    BlockInstance, ChangeEvent, Document, EngineError, InstanceCollection, NodeId, Presenter, PropertyValue,
    Selection, SequentialUids, StructuredEditing, Uid,
};

#[derive(Default)]
struct Recorder {
    renders: usize,
    selections: Vec<Option<Uid>>,
}

impl Presenter for Recorder {
    fn render(&mut self, _: &[BlockInstance], _: &BTreeSet<Uid>, _: Option<&Uid>) {
        self.renders += 1;
    }

    fn render_selection(&mut self, selected: Option<&BlockInstance>) {
        self.selections.push(selected.map(|i| i.uid.clone()));
    }
}

fn editing() -> StructuredEditing {
    let registry = demo::registry(SequentialUids::new("b")).unwrap();
    StructuredEditing::attach(Document::new(), registry).unwrap()
}

fn loaded() -> StructuredEditing {
    let mut editing = editing();
    editing
        .load(&json!([
            { "typeName": "headline", "uid": "h", "slots": { "main": "<h2>Hi</h2>" } },
            { "typeName": "text", "uid": "t", "slots": { "main": "<p>Body</p>" } },
            { "typeName": "image", "uid": "i", "properties": { "url": "cat.png" },
              "slots": { "caption": "<p>Cat</p>" } }
        ]))
        .unwrap();
    editing
}

fn uids(instances: &[BlockInstance]) -> Vec<&str> {
    instances.iter().map(|i| i.uid.as_str()).collect()
}

/// First text node inside the block
fn text_node(editing: &StructuredEditing, uid: &str) -> NodeId {
    let tree = editing.document().tree();
    let block = editing.find_block(&Uid::new(uid)).unwrap();
    tree.descendants(block)
        .into_iter()
        .find(|node| tree.text(*node).is_some())
        .unwrap()
}

fn type_into(editing: &mut StructuredEditing, uid: &str, text: &str) -> Vec<ChangeEvent> {
    let node = text_node(editing, uid);
    let offset = editing.document().tree().text(node).unwrap().len();
    editing
        .change(|w| w.insert_text(node, offset, text))
        .unwrap()
}

#[test]
fn three_inserts_then_removing_the_middle_one() {
    let mut editing = editing();
    let mut collection = InstanceCollection::default();
    let mut presenter = Recorder::default();
    let now = Instant::now();

    let mut inserted = Vec::new();
    for (position, type_name) in ["headline", "text", "image"].into_iter().enumerate() {
        let events = editing.insert_default(type_name).unwrap();
        let ChangeEvent::Insert { index, instances } = &events[0] else {
            panic!("expected insert, got {events:?}");
        };
        assert_eq!(*index, position);
        assert_eq!(instances.len(), 1);
        inserted.push(instances[0].uid.clone());
        collection.apply_all(&events, now, &mut presenter).unwrap();
    }
    assert_eq!(uids(collection.instances()), vec!["b1", "b2", "b3"]);

    let events = editing.remove_block(&inserted[1]).unwrap();

    assert_eq!(events, vec![ChangeEvent::Remove { index: 1, count: 1 }]);
    collection.apply_all(&events, now, &mut presenter).unwrap();
    assert_eq!(uids(collection.instances()), vec!["b1", "b3"]);
}

#[test]
fn one_batch_load_is_one_insert() {
    let mut editing = editing();

    let events = editing
        .load(&json!([
            { "typeName": "headline", "slots": { "main": "<h2>A</h2>" } },
            { "typeName": "text", "slots": { "main": "<p>B</p>" } },
            { "typeName": "image", "slots": { "caption": "<p>C</p>" } }
        ]))
        .unwrap();

    assert_eq!(events.len(), 1);
    let ChangeEvent::Insert { index, instances } = &events[0] else {
        panic!("expected insert, got {events:?}");
    };
    assert_eq!(*index, 0);
    assert_eq!(uids(instances), vec!["b1", "b2", "b3"]);
}

#[test]
fn replayed_events_mirror_the_document() {
    let mut editing = editing();
    let mirror = Rc::new(RefCell::new(InstanceCollection::default()));
    let sink = Rc::clone(&mirror);
    editing.subscribe(move |event| {
        sink.borrow_mut()
            .apply(event, Instant::now(), &mut Recorder::default())
            .unwrap();
    });

    editing
        .load(&json!([
            { "typeName": "headline", "uid": "h", "slots": { "main": "<h2>Hi</h2>" } },
            { "typeName": "text", "uid": "t", "slots": { "main": "<p>Body</p>" } },
            { "typeName": "image", "uid": "i", "slots": { "caption": "<p>Cat</p>" } }
        ]))
        .unwrap();
    type_into(&mut editing, "t", " text");
    editing.move_block(&Uid::new("i"), 0).unwrap();
    editing.insert_default("video").unwrap();
    editing
        .set_block_property(&Uid::new("h"), "level", PropertyValue::from(3))
        .unwrap();
    editing.remove_block(&Uid::new("t")).unwrap();
    editing
        .change(|w| {
            let root = w.tree().root();
            w.insert_markup(root, 1, "<p>Dropped in</p>").map(|_| ())
        })
        .unwrap();

    let expected = editing.instances().unwrap();
    assert_eq!(mirror.borrow().instances(), expected.as_slice());
    assert_eq!(expected[0].uid, Uid::new("i"));
    assert_eq!(expected[1].type_name, "text");
    assert_eq!(expected[1].slot("main"), Some("<p>Dropped in</p>"));
}

#[test]
fn several_edits_in_one_block_emit_one_update() {
    let mut editing = loaded();
    let node = text_node(&editing, "h");

    let events = editing
        .change(|w| {
            w.insert_text(node, 2, "!")?;
            w.insert_text(node, 3, "!")?;
            w.delete_text(node, 0..1)?;
            w.insert_text(node, 0, "O")
        })
        .unwrap();

    assert_eq!(events.len(), 1);
    let ChangeEvent::Update { instance } = &events[0] else {
        panic!("expected update, got {events:?}");
    };
    assert_eq!(instance.uid, Uid::new("h"));
    assert_eq!(instance.slot("main"), Some("<h2>Oi!!</h2>"));
}

#[test]
fn set_property_round_trips_through_the_document() {
    let mut editing = loaded();
    let mut collection = InstanceCollection::default();
    let mut presenter = Recorder::default();
    let now = Instant::now();
    let seed = ChangeEvent::Insert {
        index: 0,
        instances: editing.instances().unwrap(),
    };
    collection.apply(&seed, now, &mut presenter).unwrap();
    let before = collection.lookup(&Uid::new("i")).unwrap().clone();

    let events = collection
        .set_property(&mut editing, &Uid::new("i"), "align", PropertyValue::from("right"))
        .unwrap();

    assert_eq!(collection.lookup(&Uid::new("i")), Some(&before));
    assert_eq!(events.len(), 1);
    let ChangeEvent::Update { instance } = &events[0] else {
        panic!("expected update, got {events:?}");
    };
    assert_eq!(instance.uid, Uid::new("i"));
    assert_eq!(instance.property("align"), Some(&PropertyValue::from("right")));
    assert_eq!(instance.slots, before.slots);
    let mut expected = before.properties.clone();
    expected.insert("align".to_string(), PropertyValue::from("right"));
    assert_eq!(instance.properties, expected);

    collection.apply_all(&events, now, &mut presenter).unwrap();
    assert_eq!(collection.lookup(&Uid::new("i")), Some(instance));
}

#[test]
fn re_render_keeps_slot_content() {
    let mut editing = loaded();
    let uid = Uid::new("i");
    let caption = editing.view().slot_element(&uid, "caption").unwrap();
    let content = editing.view().children(caption).to_vec();
    let text = editing.view().text_content(caption);
    let nodes = editing.view().node_count();

    editing
        .set_block_property(&uid, "align", PropertyValue::from("right"))
        .unwrap();

    let view = editing.view();
    let caption = view.slot_element(&uid, "caption").unwrap();
    assert_eq!(view.children(caption), content.as_slice());
    assert_eq!(view.text_content(caption), text);
    assert_eq!(view.node_count(), nodes);
    assert!(view.to_markup(view.block_root(&uid).unwrap()).contains("align-right"));
}

#[test]
fn caret_moves_inside_a_block_coalesce() {
    let mut editing = loaded();
    let node = text_node(&editing, "h");

    let first = editing.set_selection(Some(Selection::caret(node, 0))).unwrap();
    let second = editing.set_selection(Some(Selection::caret(node, 1))).unwrap();
    let third = editing.set_selection(Some(Selection::caret(node, 2))).unwrap();

    assert_eq!(
        first,
        vec![ChangeEvent::SelectionChanged {
            uid: Some(Uid::new("h"))
        }]
    );
    assert!(second.is_empty());
    assert!(third.is_empty());

    let root = editing.document().tree().root();
    let outside = editing.set_selection(Some(Selection::Node(root))).unwrap();
    assert_eq!(outside, vec![ChangeEvent::SelectionChanged { uid: None }]);
    assert!(editing.set_selection(None).unwrap().is_empty());
}

#[test]
fn typing_burst_refreshes_once() {
    let mut editing = loaded();
    let mut collection = InstanceCollection::new(Duration::from_millis(100));
    let mut presenter = Recorder::default();
    let start = Instant::now();
    let seed = ChangeEvent::Insert {
        index: 0,
        instances: editing.instances().unwrap(),
    };
    collection.apply(&seed, start, &mut presenter).unwrap();

    let mut now = start;
    for key in ["a", "b", "c", "d"] {
        now += Duration::from_millis(40);
        let events = type_into(&mut editing, "t", key);
        assert_eq!(events.len(), 1);
        collection.apply_all(&events, now, &mut presenter).unwrap();
        assert!(!collection.tick(now, &mut presenter));
    }

    assert!(collection.tick(now + Duration::from_millis(100), &mut presenter));
    assert_eq!(presenter.renders, 1);
    assert_eq!(
        collection.lookup(&Uid::new("t")).unwrap().slot("main"),
        Some("<p>Bodyabcd</p>")
    );
    assert_eq!(collection.modified(), &BTreeSet::from([Uid::new("t")]));
}

#[test]
fn moving_a_block_is_remove_then_insert() {
    let mut editing = loaded();

    let events = editing.move_block(&Uid::new("h"), 2).unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ChangeEvent::Remove { index: 0, count: 1 });
    let ChangeEvent::Insert { index, instances } = &events[1] else {
        panic!("expected insert, got {events:?}");
    };
    assert_eq!(*index, 2);
    assert_eq!(uids(instances), vec!["h"]);
}

#[test]
fn blocks_cannot_be_nested() {
    let mut editing = loaded();
    let before = editing.export().unwrap();
    let host = editing.find_block(&Uid::new("t")).unwrap();
    let mut nested = editing.instance(&Uid::new("t")).unwrap();
    nested.uid = Uid::new("n");

    let err = editing
        .change(|w| {
            let block = build_block(w, &nested)?;
            w.append(block, host)
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::ConsistencyViolation(_)));
    assert_eq!(editing.export().unwrap(), before);

    let events = type_into(&mut editing, "t", "!");
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ChangeEvent::Update { instance } if instance.uid == Uid::new("t")));
}

#[test]
fn untyped_wrapper_holding_a_block_is_rejected() {
    let mut editing = loaded();
    let before = editing.instances().unwrap();
    let inner = editing.instance(&Uid::new("h")).unwrap();

    let err = editing
        .change(|w| {
            let wrapper = w.create_element("section");
            let mut copy = inner.clone();
            copy.uid = Uid::new("copy");
            let block = build_block(w, &copy)?;
            w.append(block, wrapper)?;
            let root = w.tree().root();
            w.append(wrapper, root)
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::ConsistencyViolation(_)));
    assert_eq!(editing.instances().unwrap(), before);
}
