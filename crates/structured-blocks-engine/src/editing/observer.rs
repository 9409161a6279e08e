//! Document change observer.
//!
//! Turns a batch of low-level document edits into block lifecycle events.
//! Classification runs in two steps:
//!
//! 1. [`DocumentChangeObserver::post_fix`] runs inside the batch, on the
//!    staged tree: it wraps untyped top-level content in default text
//!    blocks, diffs the top-level block sequence against the previous
//!    batch, assigns uids to inserted blocks that lack a unique one, finds
//!    the existing blocks touched by content edits, and validates every
//!    affected block. Any error here rolls the whole batch back.
//! 2. [`DocumentChangeObserver::commit`] runs on the committed tree and reads
//!    the instances for the emitted events from the live document.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::document::blocks::{self, read_instance};
use crate::document::{
    ATTR_PROPERTIES, ATTR_TYPE, ATTR_UID, AttributeValue, Change, NodeId, Tree, Writer,
};
use crate::editing::diff::{SequenceChange, diff, diff_to_changes};
use crate::error::{EngineError, Result};
use crate::models::{BlockInstance, ChangeEvent, Uid};
use crate::registry::{BlockRegistry, slot_names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Idle,
    Classifying,
    Committed,
}

/// Identity of a top-level block as of the last committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
struct BlockRecord {
    node: NodeId,
    uid: Uid,
    type_name: String,
}

/// Outcome of classifying one batch, consumed by `commit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub structural: Vec<SequenceChange>,
    pub inserted: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub wrapped: usize,
}

#[derive(Debug)]
pub struct DocumentChangeObserver {
    state: ObserverState,
    previous: Vec<BlockRecord>,
}

impl Default for DocumentChangeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentChangeObserver {
    pub fn new() -> Self {
        Self {
            state: ObserverState::Idle,
            previous: Vec::new(),
        }
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    /// Enter `Classifying` for a new batch
    pub fn begin(&mut self) -> Result<()> {
        if self.state != ObserverState::Idle {
            return Err(EngineError::ReentrantMutation);
        }
        self.state = ObserverState::Classifying;
        Ok(())
    }

    /// Return to `Idle` after a rolled back batch
    pub fn abort(&mut self) {
        self.state = ObserverState::Idle;
    }

    /// Return to `Idle` once the batch's events have been delivered
    pub fn finish(&mut self) {
        self.state = ObserverState::Idle;
    }

    /// Normalise and classify the staged tree of the running batch
    pub fn post_fix(
        &self,
        writer: &mut Writer<'_>,
        registry: &mut BlockRegistry,
    ) -> Result<Classification> {
        if self.state != ObserverState::Classifying {
            return Err(EngineError::InvalidOperation(
                "post-fix outside of a classifying batch".to_string(),
            ));
        }

        let wrapped = wrap_untyped_content(writer, registry)?;

        let tree = writer.tree();
        let root = tree.root();
        let current: Vec<NodeId> = tree.children(root).to_vec();
        let previous: Vec<NodeId> = self.previous.iter().map(|record| record.node).collect();
        let ops = diff(&previous, &current);
        let structural = diff_to_changes(&ops);

        let mut inserted = Vec::new();
        for change in &structural {
            if let SequenceChange::Insert { index, count } = *change {
                inserted.extend_from_slice(&current[index..index + count]);
            }
        }
        let inserted_set: HashSet<NodeId> = inserted.iter().copied().collect();

        check_nesting(tree, writer.changes(), &inserted)?;
        self.check_existing_identities(tree, &current, &inserted_set)?;
        assign_uids(writer, registry, &current, &inserted)?;

        let tree = writer.tree();
        let position: HashMap<NodeId, usize> =
            current.iter().enumerate().map(|(i, node)| (*node, i)).collect();
        let mut touched = BTreeSet::new();
        for change in writer.changes() {
            let Some(block) = tree.block_ancestor(change.location()) else {
                continue;
            };
            if inserted_set.contains(&block) {
                continue;
            }
            if let Some(index) = position.get(&block) {
                touched.insert(*index);
            }
        }
        let updated: Vec<NodeId> = touched.into_iter().map(|index| current[index]).collect();

        for node in inserted.iter().chain(updated.iter()) {
            validate_block(tree, registry, *node)?;
        }

        Ok(Classification {
            structural,
            inserted,
            updated,
            wrapped,
        })
    }

    /// Emit the batch's events from the committed tree and remember its
    /// block sequence for the next batch.
    pub fn commit(&mut self, tree: &Tree, classification: Classification) -> Result<Vec<ChangeEvent>> {
        if self.state != ObserverState::Classifying {
            return Err(EngineError::InvalidOperation(
                "commit outside of a classifying batch".to_string(),
            ));
        }
        self.state = ObserverState::Committed;

        let current = tree.children(tree.root());
        let mut events = Vec::new();
        for change in &classification.structural {
            match *change {
                SequenceChange::Remove { index, count } => {
                    events.push(ChangeEvent::Remove { index, count });
                }
                SequenceChange::Insert { index, count } => {
                    let instances = current
                        .get(index..index + count)
                        .ok_or_else(|| {
                            EngineError::ConsistencyViolation(format!(
                                "inserted run {index}..{} is outside the document",
                                index + count
                            ))
                        })?
                        .iter()
                        .map(|node| read_instance(tree, *node))
                        .collect::<Result<Vec<BlockInstance>>>()?;
                    events.push(ChangeEvent::Insert { index, instances });
                }
            }
        }
        for node in &classification.updated {
            events.push(ChangeEvent::Update {
                instance: read_instance(tree, *node)?,
            });
        }

        self.previous = records(tree)?;
        Ok(events)
    }

    /// Adopt the current block sequence without emitting anything
    pub fn prime(&mut self, tree: &Tree) -> Result<()> {
        self.previous = records(tree)?;
        Ok(())
    }

    /// Blocks kept in place by the batch must keep their uid and type
    fn check_existing_identities(
        &self,
        tree: &Tree,
        current: &[NodeId],
        inserted: &HashSet<NodeId>,
    ) -> Result<()> {
        let before: HashMap<NodeId, &BlockRecord> = self
            .previous
            .iter()
            .map(|record| (record.node, record))
            .collect();

        for node in current.iter().filter(|node| !inserted.contains(node)) {
            let Some(record) = before.get(node) else {
                continue;
            };
            if blocks::uid_of(tree, *node).as_ref() != Some(&record.uid) {
                return Err(EngineError::ConsistencyViolation(format!(
                    "uid of block {} changed",
                    record.uid
                )));
            }
            if blocks::type_of(tree, *node) != Some(record.type_name.as_str()) {
                return Err(EngineError::ConsistencyViolation(format!(
                    "type of block {} changed",
                    record.uid
                )));
            }
        }
        Ok(())
    }
}

fn records(tree: &Tree) -> Result<Vec<BlockRecord>> {
    tree.children(tree.root())
        .iter()
        .map(|node| {
            let uid = blocks::uid_of(tree, *node).ok_or_else(|| {
                EngineError::ConsistencyViolation(format!("top-level node {node} has no uid"))
            })?;
            let type_name = blocks::type_of(tree, *node)
                .ok_or_else(|| EngineError::ConsistencyViolation(format!("block {uid} has no type")))?
                .to_string();
            Ok(BlockRecord {
                node: *node,
                uid,
                type_name,
            })
        })
        .collect()
}

/// Wrap every top-level child that is not a block container in its own
/// default text block, until none is left.
fn wrap_untyped_content(writer: &mut Writer<'_>, registry: &BlockRegistry) -> Result<usize> {
    let mut wrapped = 0;
    loop {
        let tree = writer.tree();
        let root = tree.root();
        let Some(untyped) = tree
            .children(root)
            .iter()
            .copied()
            .find(|node| !tree.is_block(*node))
        else {
            return Ok(wrapped);
        };

        let definition = registry.default_text_type()?;
        let type_name = definition.type_name().to_string();
        let properties = definition.default_properties().clone();

        let block = writer.create_element(blocks::element_name(definition.kind()));
        writer.set_attribute(block, ATTR_TYPE, type_name.as_str())?;
        writer.set_attribute(block, ATTR_PROPERTIES, AttributeValue::Properties(properties))?;
        writer.wrap(untyped, block)?;
        wrapped += 1;
    }
}

/// Blocks may only sit directly under the root. Every subtree added by the
/// batch, and every newly inserted top-level block, is searched for a block
/// container at a deeper level.
fn check_nesting(tree: &Tree, changes: &[Change], inserted: &[NodeId]) -> Result<()> {
    let root = tree.root();
    let added = changes.iter().flat_map(|change| match change {
        Change::Insert { nodes, .. } => nodes.as_slice(),
        _ => &[] as &[NodeId],
    });
    for node in added.chain(inserted).filter(|node| tree.is_attached(**node)) {
        let subtree = std::iter::once(*node).chain(tree.descendants(*node));
        for candidate in subtree {
            if tree.is_block(candidate) && tree.parent(candidate) != Some(root) {
                let uid = blocks::uid_of(tree, candidate)
                    .map(|uid| uid.to_string())
                    .unwrap_or_else(|| candidate.to_string());
                return Err(EngineError::ConsistencyViolation(format!(
                    "block {uid} is nested inside another node; blocks only live at the top level"
                )));
            }
        }
    }
    Ok(())
}

/// Give every inserted block a uid no other top-level block holds
fn assign_uids(
    writer: &mut Writer<'_>,
    registry: &mut BlockRegistry,
    current: &[NodeId],
    inserted: &[NodeId],
) -> Result<()> {
    let inserted_set: HashSet<NodeId> = inserted.iter().copied().collect();
    let mut taken: HashSet<Uid> = current
        .iter()
        .filter(|node| !inserted_set.contains(node))
        .filter_map(|node| blocks::uid_of(writer.tree(), *node))
        .collect();

    for node in inserted {
        match blocks::uid_of(writer.tree(), *node) {
            Some(uid) if !taken.contains(&uid) => {
                taken.insert(uid);
            }
            existing => {
                let uid = registry.generate_uid(|candidate| taken.contains(candidate))?;
                if let Some(existing) = existing {
                    log::debug!("block uid {existing} is already in use, reassigned {uid}");
                }
                writer.set_attribute(*node, ATTR_UID, uid.as_str())?;
                taken.insert(uid);
            }
        }
    }
    Ok(())
}

/// Check a block against its definition: the type is registered, the
/// container matches the type's kind and the slots match the template.
fn validate_block(tree: &Tree, registry: &BlockRegistry, node: NodeId) -> Result<()> {
    let instance = read_instance(tree, node)?;
    let definition = registry.definition(&instance.type_name)?;
    if definition.kind() != instance.kind {
        return Err(EngineError::ConsistencyViolation(format!(
            "block {} of type {} is stored as {:?}",
            instance.uid, instance.type_name, instance.kind
        )));
    }

    let root = registry.render(&instance.type_name, &instance.properties)?;
    let produced: BTreeSet<String> = slot_names(&root)
        .map_err(|reason| EngineError::render(&instance.type_name, reason))?
        .into_iter()
        .collect();
    let held: BTreeSet<String> = instance.slots.keys().cloned().collect();
    if produced != held {
        return Err(EngineError::ConsistencyViolation(format!(
            "block {} holds slots {held:?} but its template renders {produced:?}",
            instance.uid
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, blocks::build_block};
    use crate::models::BlockDescriptor;
    use crate::tests::demo_registry;
    use pretty_assertions::assert_eq;

    fn run(
        observer: &mut DocumentChangeObserver,
        doc: &mut Document,
        registry: &mut BlockRegistry,
        edit: impl FnOnce(&mut Writer<'_>) -> Result<()>,
    ) -> Result<Vec<ChangeEvent>> {
        observer.begin()?;
        let result = doc.change(|w| {
            edit(w)?;
            observer.post_fix(w, registry)
        });
        let classification = match result {
            Ok((_, classification)) => classification,
            Err(e) => {
                observer.abort();
                return Err(e);
            }
        };
        let events = observer.commit(doc.tree(), classification)?;
        observer.finish();
        Ok(events)
    }

    fn uids(events: &[ChangeEvent]) -> Vec<Vec<String>> {
        events
            .iter()
            .map(|event| match event {
                ChangeEvent::Insert { instances, .. } => {
                    instances.iter().map(|i| i.uid.to_string()).collect()
                }
                ChangeEvent::Update { instance } => vec![instance.uid.to_string()],
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_untyped_content_is_wrapped_in_default_text_blocks() {
        let mut observer = DocumentChangeObserver::new();
        let mut doc = Document::new();
        let mut registry = demo_registry();

        let events = run(&mut observer, &mut doc, &mut registry, |w| {
            let root = w.tree().root();
            w.insert_markup(root, 0, "<p>One</p><p>Two</p>").map(|_| ())
        })
        .unwrap();

        assert_eq!(events.len(), 1);
        let ChangeEvent::Insert { index, instances } = &events[0] else {
            panic!("expected insert, got {events:?}");
        };
        assert_eq!(*index, 0);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].type_name, "text");
        assert_eq!(instances[0].slot("main"), Some("<p>One</p>"));
        assert_eq!(instances[1].slot("main"), Some("<p>Two</p>"));
        assert_ne!(instances[0].uid, instances[1].uid);
    }

    #[test]
    fn test_duplicate_uid_on_insert_is_reassigned() {
        let mut observer = DocumentChangeObserver::new();
        let mut doc = Document::new();
        let mut registry = demo_registry();
        let first = registry
            .normalize(BlockDescriptor::new("text").with_uid("same"))
            .unwrap();

        run(&mut observer, &mut doc, &mut registry, |w| {
            let block = build_block(w, &first)?;
            let root = w.tree().root();
            w.append(block, root)
        })
        .unwrap();

        let events = run(&mut observer, &mut doc, &mut registry, |w| {
            let block = build_block(w, &first)?;
            let root = w.tree().root();
            w.append(block, root)
        })
        .unwrap();

        let inserted = &uids(&events)[0];
        assert_eq!(inserted.len(), 1);
        assert_ne!(inserted[0], "same");
    }

    #[test]
    fn test_inserted_block_edited_in_same_batch_gets_no_update() {
        let mut observer = DocumentChangeObserver::new();
        let mut doc = Document::new();
        let mut registry = demo_registry();
        let text = registry.normalize(BlockDescriptor::new("text")).unwrap();

        let events = run(&mut observer, &mut doc, &mut registry, |w| {
            let block = build_block(w, &text)?;
            let root = w.tree().root();
            w.append(block, root)?;
            let t = w.create_text("typed");
            w.append(t, block)
        })
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "insert");
    }

    #[test]
    fn test_unknown_type_rolls_back() {
        let mut observer = DocumentChangeObserver::new();
        let mut doc = Document::new();
        let mut registry = demo_registry();
        let mut bogus = registry.normalize(BlockDescriptor::new("text")).unwrap();
        bogus.type_name = "table".to_string();

        let err = run(&mut observer, &mut doc, &mut registry, |w| {
            let block = build_block(w, &bogus)?;
            let root = w.tree().root();
            w.append(block, root)
        })
        .unwrap_err();

        assert_eq!(err, EngineError::UnknownType("table".to_string()));
        assert_eq!(observer.state(), ObserverState::Idle);
        assert!(doc.tree().children(doc.tree().root()).is_empty());
    }

    #[test]
    fn test_changing_uid_of_existing_block_is_rejected() {
        let mut observer = DocumentChangeObserver::new();
        let mut doc = Document::new();
        let mut registry = demo_registry();
        let text = registry.normalize(BlockDescriptor::new("text")).unwrap();

        run(&mut observer, &mut doc, &mut registry, |w| {
            let block = build_block(w, &text)?;
            let root = w.tree().root();
            w.append(block, root)
        })
        .unwrap();
        let block = doc.tree().children(doc.tree().root())[0];

        let err = run(&mut observer, &mut doc, &mut registry, |w| {
            w.set_attribute(block, ATTR_UID, "stolen")
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::ConsistencyViolation(_)));
    }

    #[test]
    fn test_begin_while_classifying_is_reentrant() {
        let mut observer = DocumentChangeObserver::new();
        observer.begin().unwrap();
        assert_eq!(observer.begin(), Err(EngineError::ReentrantMutation));
        observer.abort();
        observer.begin().unwrap();
    }
}
