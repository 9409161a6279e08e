/*!
 * # Structured editing
 *
 * Keeps three things in agreement: the host [`Document`], the block
 * instances it holds, and the rendered [`EditingView`].
 *
 * ## Single mutation path
 *
 * Every mutation, whether typed by a user or requested through the API
 * (`set_block_property`, `insert_default`, `load`...), is one call to
 * [`StructuredEditing::change`]:
 *
 * 1. The [`DocumentChangeObserver`] enters `Classifying`.
 * 2. The edit closure and the observer's post-fix run in one atomic batch
 *    of the document. An error from either rolls the batch back.
 * 3. The observer commits the batch and emits its lifecycle events:
 *    removals and insertions in document order, then one update per touched
 *    block, read from the committed document.
 * 4. The view applies the events, re-rendering blocks whose properties
 *    changed without rebuilding their slot content.
 * 5. The [`SelectionTracker`] appends a selection event if the selected
 *    block changed.
 * 6. Events go out on the [`EventBus`]. Listeners only receive the event,
 *    so they cannot start a nested batch.
 *
 * ## Module Structure
 *
 * - [`diff`]: LCS edit scripts over the top-level block sequence
 * - [`observer`]: batch classification state machine
 * - [`selection`]: selected block tracking
 * - [`view`]: slot-preserving presentation reconciler
 * - [`bus`]: outbound event notification
 */

pub mod bus;
pub mod diff;
pub mod observer;
pub mod selection;
pub mod view;

pub use bus::{EventBus, SubscriptionId};
pub use diff::{DiffOp, SequenceChange, diff, diff_to_changes};
pub use observer::{Classification, DocumentChangeObserver, ObserverState};
pub use selection::SelectionTracker;
pub use view::{EditingView, Mapper, RenderedBlock, ViewData, ViewId};

use crate::codec;
use crate::document::blocks::{self, build_block, read_instance};
use crate::document::{ATTR_PROPERTIES, AttributeValue, Document, NodeId, Selection, Writer};
use crate::error::{EngineError, Result};
use crate::models::{
    BlockDescriptor, BlockInstance, BlockKind, ChangeEvent, PropertyValue, Uid,
    descriptors_from_json,
};
use crate::registry::BlockRegistry;

/// An editing session attached to a document
#[derive(Debug)]
pub struct StructuredEditing {
    document: Document,
    registry: BlockRegistry,
    observer: DocumentChangeObserver,
    selection: SelectionTracker,
    view: EditingView,
    bus: EventBus,
}

impl StructuredEditing {
    /// Take over a document.
    ///
    /// Untyped top-level content is wrapped and missing uids are assigned
    /// without emitting events, then every block is rendered.
    pub fn attach(mut document: Document, mut registry: BlockRegistry) -> Result<Self> {
        let mut observer = DocumentChangeObserver::new();
        observer.begin()?;
        let classified = document.change(|writer| observer.post_fix(writer, &mut registry));
        let classification = match classified {
            Ok((_, classification)) => classification,
            Err(e) => {
                log::warn!("cannot attach to document: {e}");
                return Err(e);
            }
        };
        if classification.wrapped > 0 {
            log::debug!(
                "wrapped {} untyped top-level nodes on attach",
                classification.wrapped
            );
        }
        observer.commit(document.tree(), classification)?;
        observer.finish();

        let mut selection = SelectionTracker::new();
        selection.prime(&document);
        let mut view = EditingView::new();
        view.render_all(&document, &registry)?;

        Ok(Self {
            document,
            registry,
            observer,
            selection,
            view,
            bus: EventBus::new(),
        })
    }

    /// Hand the document and registry back
    pub fn detach(self) -> (Document, BlockRegistry) {
        (self.document, self.registry)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn view(&self) -> &EditingView {
        &self.view
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Run one mutation batch and return the events it produced.
    ///
    /// A batch that commits is always published. If the view then fails to
    /// follow, the view's error is returned after publication.
    pub fn change(
        &mut self,
        edit: impl FnOnce(&mut Writer<'_>) -> Result<()>,
    ) -> Result<Vec<ChangeEvent>> {
        self.observer.begin()?;

        let observer = &self.observer;
        let registry = &mut self.registry;
        let result = self.document.change(|writer| {
            edit(writer)?;
            observer.post_fix(writer, registry)
        });
        let (patch, classification) = match result {
            Ok(committed) => committed,
            Err(e) => {
                self.observer.abort();
                log::warn!("batch rolled back: {e}");
                return Err(e);
            }
        };

        let mut events = match self.observer.commit(self.document.tree(), classification) {
            Ok(events) => events,
            Err(e) => {
                self.observer.abort();
                return Err(e);
            }
        };
        // The batch is committed; its events go out even if the view cannot follow
        let rendered = self.view.apply(&events, &self.document, &self.registry);
        if let Err(e) = &rendered {
            log::warn!("view is behind the document after v{}: {e}", patch.version);
        }
        events.extend(self.selection.observe(&self.document));

        log::debug!(
            "batch v{}: {} changes, events [{}]",
            patch.version,
            patch.changes.len(),
            events
                .iter()
                .map(ChangeEvent::name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        for event in &events {
            self.bus.publish(event);
        }
        self.observer.finish();
        rendered?;
        Ok(events)
    }

    /// Replace the document content with the given descriptor payload.
    ///
    /// Every descriptor is validated and normalised before the document is
    /// touched; a failure leaves the document as it was.
    pub fn load(&mut self, payload: &serde_json::Value) -> Result<Vec<ChangeEvent>> {
        let descriptors = descriptors_from_json(payload)?;
        let mut instances = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            self.check_required_slots(index, &descriptor)?;
            instances.push(self.registry.normalize(descriptor)?);
        }
        self.replace_content(instances)
    }

    /// Replace the document content with blocks imported from exported markup
    pub fn load_markup(&mut self, source: &str) -> Result<Vec<ChangeEvent>> {
        let instances = codec::import(source, &mut self.registry)?;
        self.replace_content(instances)
    }

    fn check_required_slots(&self, index: usize, descriptor: &BlockDescriptor) -> Result<()> {
        let definition = self.registry.definition(&descriptor.type_name)?;
        let Some(slots) = &descriptor.slots else {
            return Err(EngineError::MalformedData(format!(
                "descriptor {index} ({}) has no slots",
                descriptor.type_name
            )));
        };
        if let Some(missing) = definition
            .slot_names()
            .iter()
            .find(|name| !slots.contains_key(*name))
        {
            return Err(EngineError::MalformedData(format!(
                "descriptor {index} ({}) lacks slot {missing}",
                descriptor.type_name
            )));
        }
        Ok(())
    }

    fn replace_content(&mut self, instances: Vec<BlockInstance>) -> Result<Vec<ChangeEvent>> {
        self.change(|writer| {
            let root = writer.tree().root();
            for node in writer.tree().children(root).to_vec() {
                writer.remove(node)?;
            }
            for instance in &instances {
                let block = build_block(writer, instance)?;
                writer.append(block, root)?;
            }
            Ok(())
        })
    }

    /// Insert a default instance of `type_name` after the block holding the
    /// selection (or at the end) and select it.
    pub fn insert_default(&mut self, type_name: &str) -> Result<Vec<ChangeEvent>> {
        let instance = self.registry.normalize(BlockDescriptor::new(type_name))?;
        let tree = self.document.tree();
        let index = self
            .document
            .selection()
            .and_then(|selection| tree.block_ancestor(selection.anchor()))
            .and_then(|block| tree.index_in_parent(block))
            .map(|index| index + 1)
            .unwrap_or_else(|| tree.children(tree.root()).len());

        self.change(|writer| {
            let block = build_block(writer, &instance)?;
            let root = writer.tree().root();
            writer.insert(block, root, index)?;
            let selection = match instance.kind {
                BlockKind::ObjectLike => Selection::Node(block),
                BlockKind::TextLike => Selection::caret(block, 0),
            };
            writer.set_selection(Some(selection))
        })
    }

    /// Set one property of a block; emits nothing if the value is unchanged
    pub fn set_block_property(
        &mut self,
        uid: &Uid,
        property: &str,
        value: PropertyValue,
    ) -> Result<Vec<ChangeEvent>> {
        let node = self.require_block(uid)?;
        let tree = self.document.tree();
        let type_name = blocks::type_of(tree, node)
            .ok_or_else(|| EngineError::ConsistencyViolation(format!("block {uid} has no type")))?;
        self.registry.validate_property(type_name, property, &value)?;

        let mut properties = blocks::properties_of(tree, node)?;
        properties.insert(property.to_string(), value);
        self.change(|writer| {
            writer.set_attribute(node, ATTR_PROPERTIES, AttributeValue::Properties(properties))
        })
    }

    pub fn remove_block(&mut self, uid: &Uid) -> Result<Vec<ChangeEvent>> {
        let node = self.require_block(uid)?;
        self.change(|writer| writer.remove(node))
    }

    /// Move a block to `index` of the block sequence without it
    pub fn move_block(&mut self, uid: &Uid, index: usize) -> Result<Vec<ChangeEvent>> {
        let node = self.require_block(uid)?;
        self.change(|writer| {
            let root = writer.tree().root();
            writer.move_to(node, root, index)
        })
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<Vec<ChangeEvent>> {
        self.change(|writer| writer.set_selection(selection))
    }

    /// Select a block: the whole block for object-like ones, a caret at its
    /// start for text-like ones.
    pub fn select_block(&mut self, uid: &Uid) -> Result<Vec<ChangeEvent>> {
        let node = self.require_block(uid)?;
        let selection = match blocks::kind_of(self.document.tree(), node) {
            Some(BlockKind::ObjectLike) => Selection::Node(node),
            _ => Selection::caret(node, 0),
        };
        self.set_selection(Some(selection))
    }

    /// Uid of the block holding the selection
    pub fn selected(&self) -> Option<&Uid> {
        self.selection.current()
    }

    /// Every block in document order, read from the document
    pub fn instances(&self) -> Result<Vec<BlockInstance>> {
        let tree = self.document.tree();
        tree.children(tree.root())
            .iter()
            .map(|node| read_instance(tree, *node))
            .collect()
    }

    pub fn find_block(&self, uid: &Uid) -> Option<NodeId> {
        blocks::find_block(self.document.tree(), uid)
    }

    pub fn instance(&self, uid: &Uid) -> Result<BlockInstance> {
        let node = self.require_block(uid)?;
        read_instance(self.document.tree(), node)
    }

    /// The whole document as exported markup
    pub fn export(&self) -> Result<String> {
        codec::export_document(&self.instances()?)
    }

    fn require_block(&self, uid: &Uid) -> Result<NodeId> {
        self.find_block(uid)
            .ok_or_else(|| EngineError::UnknownInstance(uid.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TEXT_BLOCK;
    use crate::tests::{demo_registry, document_with};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use crate::registry::BlockDefinition;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn editing() -> StructuredEditing {
        StructuredEditing::attach(Document::new(), demo_registry()).unwrap()
    }

    #[test]
    fn test_attach_wraps_untyped_content_silently() {
        let mut document = Document::new();
        document
            .change(|w| {
                let root = w.tree().root();
                w.insert_markup(root, 0, "<p>Loose</p>").map(|_| ())
            })
            .unwrap();

        let editing = StructuredEditing::attach(document, demo_registry()).unwrap();

        let instances = editing.instances().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].type_name, "text");
        assert_eq!(instances[0].slot("main"), Some("<p>Loose</p>"));
        assert_eq!(editing.view().blocks().len(), 1);
    }

    #[test]
    fn test_load_replaces_content() {
        let mut editing = editing();
        editing.insert_default("text").unwrap();

        let events = editing
            .load(&json!([
                { "typeName": "headline", "uid": "h", "slots": { "main": "<h2>Hi</h2>" } },
                { "typeName": "image", "uid": "i", "slots": { "caption": "<p>Cat</p>" } }
            ]))
            .unwrap();

        assert_eq!(events[0], ChangeEvent::Remove { index: 0, count: 1 });
        let ChangeEvent::Insert { index, instances } = &events[1] else {
            panic!("expected insert, got {events:?}");
        };
        assert_eq!(*index, 0);
        assert_eq!(
            instances.iter().map(|i| i.uid.as_str()).collect::<Vec<_>>(),
            vec!["h", "i"]
        );
        assert_eq!(instances[0].property("level"), Some(&PropertyValue::from(1)));
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let mut editing = editing();
        editing.insert_default("text").unwrap();
        let before = editing.instances().unwrap();

        let err = editing
            .load(&json!([
                { "typeName": "headline", "slots": { "main": "<h2>Hi</h2>" } },
                { "typeName": "image", "slots": {} }
            ]))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedData(_)));

        let err = editing
            .load(&json!([{ "typeName": "table", "slots": {} }]))
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownType("table".to_string()));

        assert_eq!(editing.instances().unwrap(), before);
    }

    #[test]
    fn test_insert_default_goes_after_selection_and_selects() {
        let mut editing = editing();
        editing.insert_default("headline").unwrap();
        editing.insert_default("text").unwrap();
        let first = editing.instances().unwrap()[0].uid.clone();
        editing.select_block(&first).unwrap();

        let events = editing.insert_default("image").unwrap();

        let ChangeEvent::Insert { index, instances } = &events[0] else {
            panic!("expected insert, got {events:?}");
        };
        assert_eq!(*index, 1);
        assert_eq!(
            events[1],
            ChangeEvent::SelectionChanged {
                uid: Some(instances[0].uid.clone())
            }
        );
        assert_eq!(editing.selected(), Some(&instances[0].uid));
    }

    #[test]
    fn test_unchanged_property_emits_nothing() {
        let mut editing = editing();
        editing.insert_default("image").unwrap();
        let uid = editing.instances().unwrap()[0].uid.clone();

        let events = editing
            .set_block_property(&uid, "align", PropertyValue::from("none"))
            .unwrap();
        assert!(events.is_empty());

        let err = editing
            .set_block_property(&uid, "align", PropertyValue::from("sideways"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidProperty { .. }));

        let err = editing
            .set_block_property(&Uid::new("nope"), "align", PropertyValue::from("left"))
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownInstance(Uid::new("nope")));
    }

    #[test]
    fn test_listeners_receive_published_events() {
        let mut editing = editing();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = editing.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let events = editing.insert_default("text").unwrap();
        assert_eq!(*seen.borrow(), events);

        assert!(editing.unsubscribe(id));
        editing.insert_default("text").unwrap();
        assert_eq!(seen.borrow().len(), events.len());
    }

    #[test]
    fn test_rolled_back_batch_keeps_observer_usable() {
        let mut editing = editing();
        let err = editing
            .change(|w| {
                let root = w.tree().root();
                w.insert(root, root, 0)
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(_)));
        assert_eq!(editing.observer.state(), ObserverState::Idle);

        editing.insert_default("text").unwrap();
        assert_eq!(editing.instances().unwrap().len(), 1);
    }

    #[test]
    fn test_detach_returns_document() {
        let mut registry = demo_registry();
        let document = document_with(
            &mut registry,
            vec![BlockDescriptor::new("text").with_uid("t")],
        );
        let editing = StructuredEditing::attach(document, registry).unwrap();

        let (document, registry) = editing.detach();

        let tree = document.tree();
        assert_eq!(tree.name(tree.children(tree.root())[0]), Some(TEXT_BLOCK));
        assert!(registry.contains("video"));
    }

    #[test]
    fn test_committed_events_are_published_when_the_view_fails() {
        let mut registry = demo_registry();
        let renders = Rc::new(Cell::new(0));
        let counter = Rc::clone(&renders);
        registry
            .register(
                BlockDefinition::text("flaky", move |_| {
                    counter.set(counter.get() + 1);
                    if counter.get() == 1 {
                        r#"<div data-block-slot="main"></div>"#.to_string()
                    } else {
                        String::new()
                    }
                })
                .with_default_slot("main", "<p></p>"),
            )
            .unwrap();
        let mut editing = StructuredEditing::attach(Document::new(), registry).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        editing.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let err = editing.insert_default("flaky").unwrap_err();

        assert!(matches!(err, EngineError::RenderContractViolation { .. }));
        let seen = seen.borrow();
        let Some(ChangeEvent::Insert { index: 0, instances }) = seen.first() else {
            panic!("expected the insert to be published, got {seen:?}");
        };
        assert_eq!(instances[0].type_name, "flaky");
        assert_eq!(editing.instances().unwrap(), instances.clone());
        assert_eq!(editing.observer.state(), ObserverState::Idle);
    }
}
