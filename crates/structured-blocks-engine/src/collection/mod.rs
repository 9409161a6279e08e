//! # Instance collection
//!
//! The consumer-side mirror of the document: an ordered list of
//! [`BlockInstance`] snapshots that changes only by replaying
//! [`ChangeEvent`]s. Presentation refreshes are debounced on the trailing
//! edge; selection changes are presented immediately.
//!
//! The collection never writes to itself from the outside.
//! [`InstanceCollection::set_property`] goes through the editing handle,
//! and the resulting `Update` event is what brings the collection up to date.

mod debounce;
pub mod inspector;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::trace;

pub use debounce::Debouncer;

use crate::editing::StructuredEditing;
use crate::error::{EngineError, Result};
use crate::models::{BlockInstance, ChangeEvent, PropertyValue, Uid};

/// Default delay before the listing is refreshed
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Presentation of the collection
pub trait Presenter {
    /// Full refresh, called at most once per quiet period
    fn render(
        &mut self,
        instances: &[BlockInstance],
        modified: &BTreeSet<Uid>,
        selected: Option<&Uid>,
    );

    /// Called for every selection change, never debounced
    fn render_selection(&mut self, selected: Option<&BlockInstance>);
}

#[derive(Debug)]
pub struct InstanceCollection {
    instances: Vec<BlockInstance>,
    selected: Option<Uid>,
    modified: BTreeSet<Uid>,
    refresh: Debouncer,
}

impl Default for InstanceCollection {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_DELAY)
    }
}

impl InstanceCollection {
    pub fn new(refresh_delay: Duration) -> Self {
        Self {
            instances: Vec::new(),
            selected: None,
            modified: BTreeSet::new(),
            refresh: Debouncer::new(refresh_delay),
        }
    }

    pub fn instances(&self) -> &[BlockInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn selected(&self) -> Option<&Uid> {
        self.selected.as_ref()
    }

    /// Instances changed after they were first inserted
    pub fn modified(&self) -> &BTreeSet<Uid> {
        &self.modified
    }

    pub fn lookup(&self, uid: &Uid) -> Option<&BlockInstance> {
        self.instances.iter().find(|instance| &instance.uid == uid)
    }

    /// Apply one event
    pub fn apply(
        &mut self,
        event: &ChangeEvent,
        now: Instant,
        presenter: &mut impl Presenter,
    ) -> Result<()> {
        trace!("collection applying {}", event.name());
        match event {
            ChangeEvent::Insert { index, instances } => {
                if *index > self.instances.len() {
                    return Err(EngineError::ConsistencyViolation(format!(
                        "insert at {index} past the end of {} instances",
                        self.instances.len()
                    )));
                }
                self.instances
                    .splice(*index..*index, instances.iter().cloned());
                self.refresh.schedule(now);
            }
            ChangeEvent::Remove { index, count } => {
                let end = index + count;
                if end > self.instances.len() {
                    return Err(EngineError::ConsistencyViolation(format!(
                        "remove {index}..{end} past the end of {} instances",
                        self.instances.len()
                    )));
                }
                for removed in self.instances.drain(*index..end) {
                    self.modified.remove(&removed.uid);
                }
                self.refresh.schedule(now);
            }
            ChangeEvent::Update { instance } => {
                let slot = self
                    .instances
                    .iter_mut()
                    .find(|existing| existing.uid == instance.uid)
                    .ok_or_else(|| EngineError::UnknownInstance(instance.uid.clone()))?;
                *slot = instance.clone();
                self.modified.insert(instance.uid.clone());
                self.refresh.schedule(now);
            }
            ChangeEvent::SelectionChanged { uid } => {
                self.selected = uid.clone();
                let selected = uid.as_ref().and_then(|uid| self.lookup(uid));
                presenter.render_selection(selected);
            }
        }
        Ok(())
    }

    pub fn apply_all<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a ChangeEvent>,
        now: Instant,
        presenter: &mut impl Presenter,
    ) -> Result<()> {
        for event in events {
            self.apply(event, now, presenter)?;
        }
        Ok(())
    }

    /// When the pending refresh is due, if any
    pub fn next_refresh(&self) -> Option<Instant> {
        self.refresh.deadline()
    }

    /// Render if the quiet period has passed; returns whether it rendered
    pub fn tick(&mut self, now: Instant, presenter: &mut impl Presenter) -> bool {
        if !self.refresh.fire(now) {
            return false;
        }
        self.render(presenter);
        true
    }

    /// Render a pending refresh right away
    pub fn flush(&mut self, presenter: &mut impl Presenter) -> bool {
        if !self.refresh.cancel() {
            return false;
        }
        self.render(presenter);
        true
    }

    fn render(&self, presenter: &mut impl Presenter) {
        presenter.render(&self.instances, &self.modified, self.selected.as_ref());
    }

    /// Set a property through the document.
    ///
    /// The collection is left untouched; apply the returned events to
    /// converge it.
    pub fn set_property(
        &self,
        editing: &mut StructuredEditing,
        uid: &Uid,
        name: &str,
        value: PropertyValue,
    ) -> Result<Vec<ChangeEvent>> {
        if self.lookup(uid).is_none() {
            return Err(EngineError::UnknownInstance(uid.clone()));
        }
        editing.set_block_property(uid, name, value)
    }
}
