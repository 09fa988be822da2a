//! Manipulation buffer with linear undo/redo
//!
//! The buffer is an append-only manipulation log plus a cursor:
//! - `[0, cursor)` is the head, the committable range
//! - `[cursor, len)` is the redo tail
//! - recording truncates the tail (linear history)
//!
//! Tracking is suspended by a reference count while undo/redo or replay
//! applies manipulations to the session.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::manipulation::Manipulation;
use crate::model::{
    Entity, EntitySession, ListenerId, ManipulationEvent, ManipulationMode, ModelResult,
};

use super::commit_index::CommitIndex;
use super::frame::{FrameState, ManipulationFrame};

/// Change notification delivered to buffer listeners.
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// Recorded or redone
    Added(Manipulation),
    /// Undone
    Removed(Manipulation),
    /// A head entry was extended in place by a reactive cascade
    Replaced { old: Manipulation, new: Manipulation },
    Cleared,
}

pub type BufferListener = Rc<dyn Fn(&BufferEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferListenerId(u64);

/// Read-only snapshot for UI bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_commit: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

#[derive(Default)]
struct BufferLog {
    manipulations: Vec<Manipulation>,
    cursor: usize,
    index: CommitIndex,
    frames: Vec<FrameState>,
}

pub(crate) struct BufferInner {
    session: EntitySession,
    log: RefCell<BufferLog>,
    suspend_count: Cell<u32>,
    undoing: Cell<bool>,
    redoing: Cell<bool>,
    replicating: Cell<bool>,
    listeners: RefCell<Vec<(BufferListenerId, BufferListener)>>,
    next_listener_id: Cell<u64>,
    next_frame_token: Cell<u64>,
    session_listener: Cell<Option<ListenerId>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Some(id) = self.session_listener.take() {
            self.session.remove_listener(id);
        }
    }
}

#[derive(Clone)]
pub struct ManipulationBuffer {
    inner: Rc<BufferInner>,
}

/// Suspends tracking until dropped.
pub struct TrackingSuspension {
    buffer: ManipulationBuffer,
    replicating: bool,
}

impl Drop for TrackingSuspension {
    fn drop(&mut self) {
        if self.replicating {
            self.buffer.inner.replicating.set(false);
        }
        self.buffer.resume_tracking();
    }
}

impl ManipulationBuffer {
    /// Creates a buffer recording every manipulation emitted by `session`.
    pub fn new(session: EntitySession) -> Self {
        let inner = Rc::new(BufferInner {
            session: session.clone(),
            log: RefCell::new(BufferLog::default()),
            suspend_count: Cell::new(0),
            undoing: Cell::new(false),
            redoing: Cell::new(false),
            replicating: Cell::new(false),
            listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(1),
            next_frame_token: Cell::new(1),
            session_listener: Cell::new(None),
        });

        let weak: Weak<BufferInner> = Rc::downgrade(&inner);
        let id = session.add_listener(move |event: &ManipulationEvent| {
            if let Some(inner) = weak.upgrade() {
                ManipulationBuffer { inner }.on_manipulation(event);
            }
        });
        inner.session_listener.set(Some(id));

        Self { inner }
    }

    pub fn session(&self) -> &EntitySession {
        &self.inner.session
    }

    fn on_manipulation(&self, event: &ManipulationEvent) {
        if self.inner.suspend_count.get() > 0 {
            return;
        }
        self.record(event.manipulation.clone());
    }

    // ==================
    // Tracking
    // ==================

    pub fn suspend_tracking(&self) {
        self.inner
            .suspend_count
            .set(self.inner.suspend_count.get() + 1);
    }

    pub fn resume_tracking(&self) {
        let count = self.inner.suspend_count.get();
        self.inner.suspend_count.set(count.saturating_sub(1));
    }

    /// Suspends tracking for the lifetime of the returned guard.
    pub fn suspend(&self) -> TrackingSuspension {
        self.suspend_tracking();
        TrackingSuspension {
            buffer: self.clone(),
            replicating: false,
        }
    }

    /// Suspends tracking and flags replication for the lifetime of the guard.
    pub fn replicate(&self) -> TrackingSuspension {
        self.suspend_tracking();
        self.inner.replicating.set(true);
        TrackingSuspension {
            buffer: self.clone(),
            replicating: true,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.suspend_count.get() == 0
    }

    // ==================
    // Recording
    // ==================

    /// Records a manipulation at the cursor, truncating the redo tail. Inside
    /// an open frame the manipulation goes to the innermost frame instead.
    pub fn record(&self, manipulation: Manipulation) {
        {
            let mut log = self.inner.log.borrow_mut();
            if let Some(frame) = log.frames.last_mut() {
                frame.manipulations.push(manipulation);
                return;
            }
            let cursor = log.cursor;
            log.manipulations.truncate(cursor);
            log.index.add(&manipulation);
            log.manipulations.push(manipulation.clone());
            log.cursor += 1;
        }
        self.notify(&BufferEvent::Added(manipulation));
    }

    /// Steps the cursor back and applies the inverse. No-op at the start.
    pub fn undo(&self) -> ModelResult<()> {
        let manipulation = {
            let mut log = self.inner.log.borrow_mut();
            if log.cursor == 0 {
                return Ok(());
            }
            log.cursor -= 1;
            let manipulation = log.manipulations[log.cursor].clone();
            log.index.remove(&manipulation);
            manipulation
        };

        self.inner.undoing.set(true);
        let result = {
            let _suspension = self.suspend();
            self.inner
                .session
                .apply(&manipulation.inverse(), ManipulationMode::Local)
        };
        self.inner.undoing.set(false);

        if let Err(e) = result {
            let mut log = self.inner.log.borrow_mut();
            log.index.add(&manipulation);
            log.cursor += 1;
            return Err(e);
        }
        self.notify(&BufferEvent::Removed(manipulation));
        Ok(())
    }

    /// Re-applies the manipulation at the cursor. No-op at the end.
    pub fn redo(&self) -> ModelResult<()> {
        let manipulation = {
            let mut log = self.inner.log.borrow_mut();
            if log.cursor >= log.manipulations.len() {
                return Ok(());
            }
            let manipulation = log.manipulations[log.cursor].clone();
            log.cursor += 1;
            log.index.add(&manipulation);
            manipulation
        };

        self.inner.redoing.set(true);
        let result = {
            let _suspension = self.suspend();
            self.inner
                .session
                .apply(&manipulation, ManipulationMode::Local)
        };
        self.inner.redoing.set(false);

        if let Err(e) = result {
            let mut log = self.inner.log.borrow_mut();
            log.cursor -= 1;
            log.index.remove(&manipulation);
            return Err(e);
        }
        self.notify(&BufferEvent::Added(manipulation));
        Ok(())
    }

    /// Drops all recorded manipulations. Open frames are kept.
    pub fn clear(&self) {
        {
            let mut log = self.inner.log.borrow_mut();
            log.manipulations.clear();
            log.cursor = 0;
            log.index.clear();
        }
        self.notify(&BufferEvent::Cleared);
    }

    /// Drops the committed manipulations and the redo tail, keeping head
    /// entries recorded after `committed` was snapshotted. Listeners see
    /// [`BufferEvent::Cleared`].
    pub fn discard_committed(&self, committed: &[Manipulation]) {
        {
            let mut log = self.inner.log.borrow_mut();
            let cursor = log.cursor;
            log.manipulations.truncate(cursor);
            log.manipulations
                .retain(|m| !committed.iter().any(|c| c.is_same(m)));
            log.cursor = log.manipulations.len();
            let BufferLog {
                manipulations,
                index,
                ..
            } = &mut *log;
            index.clear();
            for manipulation in manipulations.iter() {
                index.add(manipulation);
            }
        }
        self.notify(&BufferEvent::Cleared);
    }

    // ==================
    // Frames
    // ==================

    /// Opens a frame. With `extend_on`, closing replaces that already-recorded
    /// manipulation by a compound of it and everything the frame captured.
    pub fn open_nested_frame(&self, extend_on: Option<Manipulation>) -> ManipulationFrame {
        let token = self.inner.next_frame_token.get();
        self.inner.next_frame_token.set(token + 1);
        self.inner
            .log
            .borrow_mut()
            .frames
            .push(FrameState::new(token, extend_on));
        ManipulationFrame::new(self.clone(), token)
    }

    /// Closes the frame identified by `token`. Returns `None` when that frame
    /// is no longer open.
    pub(crate) fn close_frame(&self, token: u64) -> Option<Manipulation> {
        let depth = self
            .inner
            .log
            .borrow()
            .frames
            .iter()
            .position(|frame| frame.token == token)?;

        // Frames above `depth` that are still open are folded first
        loop {
            let above = {
                let log = self.inner.log.borrow();
                if log.frames.len() <= depth + 1 {
                    break;
                }
                log.frames.last().map(|frame| frame.token)
            };
            if let Some(above) = above {
                self.close_frame(above);
            }
        }

        let frame = {
            let mut log = self.inner.log.borrow_mut();
            if log.frames.len() != depth + 1 {
                return None;
            }
            log.frames.pop()?
        };

        let captured_only_trigger = frame.extend_on.is_some() && frame.manipulations.len() <= 1;
        if frame.manipulations.is_empty() || captured_only_trigger {
            return None;
        }

        let compound = Manipulation::compound(frame.manipulations);
        match frame.extend_on {
            Some(trigger) => {
                if !self.substitute(&trigger, compound.clone()) {
                    debug!(
                        event = "frame_trigger_missing",
                        trigger = trigger.id(),
                        "extended manipulation not found, recording cascade as new entry"
                    );
                    self.record(compound.clone());
                }
            }
            None => self.record(compound.clone()),
        }
        Some(compound)
    }

    fn substitute(&self, trigger: &Manipulation, replacement: Manipulation) -> bool {
        let replaced = {
            let mut log = self.inner.log.borrow_mut();
            if let Some(frame) = log.frames.last_mut() {
                return match frame
                    .manipulations
                    .iter()
                    .rposition(|m| m.is_same(trigger))
                {
                    Some(position) => {
                        frame.manipulations[position] = replacement;
                        true
                    }
                    None => false,
                };
            }

            let cursor = log.cursor;
            let Some(position) = log.manipulations[..cursor]
                .iter()
                .rposition(|m| m.is_same(trigger))
            else {
                return false;
            };
            let old = std::mem::replace(&mut log.manipulations[position], replacement.clone());
            log.index.remove(&old);
            log.index.add(&replacement);
            old
        };
        self.notify(&BufferEvent::Replaced {
            old: replaced,
            new: replacement,
        });
        true
    }

    // ==================
    // Queries
    // ==================

    /// The committable head range.
    pub fn commit_manipulations(&self) -> Vec<Manipulation> {
        let log = self.inner.log.borrow();
        log.manipulations[..log.cursor].to_vec()
    }

    /// Whether some head-range manipulation touches `entity`.
    pub fn is_part_of_commit(&self, entity: &Entity) -> bool {
        self.inner.log.borrow().index.contains(entity)
    }

    pub fn can_undo(&self) -> bool {
        self.head_count() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.tail_count() > 0
    }

    pub fn is_undoing(&self) -> bool {
        self.inner.undoing.get()
    }

    pub fn is_redoing(&self) -> bool {
        self.inner.redoing.get()
    }

    pub fn is_replicating(&self) -> bool {
        self.inner.replicating.get()
    }

    pub fn total_count(&self) -> usize {
        self.inner.log.borrow().manipulations.len()
    }

    pub fn head_count(&self) -> usize {
        self.inner.log.borrow().cursor
    }

    pub fn tail_count(&self) -> usize {
        let log = self.inner.log.borrow();
        log.manipulations.len() - log.cursor
    }

    pub fn state(&self) -> BufferState {
        let head = self.head_count();
        let tail = self.tail_count();
        BufferState {
            can_undo: head > 0,
            can_redo: tail > 0,
            can_commit: head > 0,
            undo_count: head,
            redo_count: tail,
        }
    }

    // ==================
    // Listeners
    // ==================

    pub fn add_listener(&self, listener: impl Fn(&BufferEvent) + 'static) -> BufferListenerId {
        let id = BufferListenerId(self.inner.next_listener_id.get());
        self.inner.next_listener_id.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: BufferListenerId) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|(lid, _)| *lid != id);
    }

    fn notify(&self, event: &BufferEvent) {
        let listeners: Vec<BufferListener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::testing::fixture_registry;

    fn setup() -> (EntitySession, ManipulationBuffer) {
        let session = EntitySession::new(fixture_registry());
        let buffer = ManipulationBuffer::new(session.clone());
        (session, buffer)
    }

    #[test]
    fn test_records_session_manipulations() {
        let (session, buffer) = setup();
        let resource = session.create_entity("test.Resource").unwrap();
        session.set(&resource, "name", "a").unwrap();

        assert_eq!(buffer.head_count(), 2);
        assert_eq!(buffer.tail_count(), 0);
        assert!(buffer.is_part_of_commit(&resource));
    }

    #[test]
    fn test_undo_redo_restore_state() {
        let (session, buffer) = setup();
        let resource = session.create_entity_with_id("test.Resource", "r").unwrap();
        session.set(&resource, "name", "first").unwrap();
        session.set(&resource, "name", "second").unwrap();
        session.set_insert(&resource, "tags", "t").unwrap();
        let total = buffer.head_count() + buffer.tail_count();

        for _ in 0..4 {
            buffer.undo().unwrap();
            assert_eq!(buffer.head_count() + buffer.tail_count(), total);
        }
        assert!(session.find("r").is_none());
        assert!(!buffer.can_undo());
        buffer.undo().unwrap();
        assert_eq!(buffer.head_count(), 0);

        for _ in 0..4 {
            buffer.redo().unwrap();
        }
        assert_eq!(session.find("r"), Some(resource.clone()));
        assert_eq!(resource.get("name"), Value::from("second"));
        assert!(resource.get("tags").as_set().unwrap().contains(&Value::from("t")));
        assert!(!buffer.can_redo());
    }

    #[test]
    fn test_record_truncates_redo_tail() {
        let (session, buffer) = setup();
        let resource = session.create_entity("test.Resource").unwrap();
        session.set(&resource, "name", "a").unwrap();
        buffer.undo().unwrap();
        assert_eq!(buffer.tail_count(), 1);

        session.set(&resource, "name", "b").unwrap();
        assert_eq!(buffer.tail_count(), 0);
        assert_eq!(buffer.total_count(), 2);
    }

    #[test]
    fn test_undo_is_not_recorded() {
        let (session, buffer) = setup();
        let resource = session.create_entity("test.Resource").unwrap();
        session.set(&resource, "name", "a").unwrap();
        buffer.undo().unwrap();
        assert_eq!(buffer.total_count(), 2);
        assert!(!buffer.is_undoing());
    }

    #[test]
    fn test_nested_frame_records_one_compound() {
        let (session, buffer) = setup();
        let frame = buffer.open_nested_frame(None);
        let resource = frame.run(|| {
            let r = session.create_entity("test.Resource").unwrap();
            session.set(&r, "name", "n").unwrap();
            session.set(&r, "creator", "c").unwrap();
            r
        });

        assert_eq!(buffer.head_count(), 1);
        assert!(buffer.commit_manipulations()[0].is_compound());

        buffer.undo().unwrap();
        assert!(!session.contains(&resource));
        assert!(!buffer.is_part_of_commit(&resource));
        buffer.redo().unwrap();
        assert_eq!(resource.get("creator"), Value::from("c"));
        assert!(buffer.is_part_of_commit(&resource));
    }

    #[test]
    fn test_extend_on_substitutes_trigger_in_place() {
        let (session, buffer) = setup();
        let resource = session.create_entity("test.Resource").unwrap();
        let trigger = session.set(&resource, "name", "n").unwrap();
        session.set(&resource, "creator", "later").unwrap();

        let frame = buffer.open_nested_frame(Some(trigger.clone()));
        session.set(&resource, "mimeType", "text/plain").unwrap();
        let compound = frame.close().unwrap();

        let head = buffer.commit_manipulations();
        assert_eq!(head.len(), 3);
        assert!(head[1].is_same(&compound));
        assert!(compound.members()[0].is_same(&trigger));
    }

    #[test]
    fn test_empty_frame_records_nothing() {
        let (_session, buffer) = setup();
        let frame = buffer.open_nested_frame(None);
        assert!(frame.close().is_none());
        assert_eq!(buffer.total_count(), 0);
    }

    #[test]
    fn test_dropped_frame_closes() {
        let (session, buffer) = setup();
        {
            let _frame = buffer.open_nested_frame(None);
            session.create_entity("test.Resource").unwrap();
            assert_eq!(buffer.head_count(), 0);
        }
        assert_eq!(buffer.head_count(), 1);
    }

    #[test]
    fn test_stale_inner_handle_leaves_later_frame_open() {
        let (session, buffer) = setup();
        let outer = buffer.open_nested_frame(None);
        let inner = buffer.open_nested_frame(None);
        session.create_entity("test.Resource").unwrap();
        // Folds the inner frame into the outer compound
        assert!(outer.close().is_some());
        assert_eq!(buffer.head_count(), 1);

        let replacement = buffer.open_nested_frame(None);
        drop(inner);
        session.create_entity("test.Resource").unwrap();
        assert_eq!(buffer.head_count(), 1);

        assert!(replacement.close().is_some());
        assert_eq!(buffer.head_count(), 2);
    }

    #[test]
    fn test_discard_committed_keeps_later_entries() {
        let (session, buffer) = setup();
        let first = session.create_entity("test.Resource").unwrap();
        session.set(&first, "name", "a").unwrap();
        let committed = buffer.commit_manipulations();

        let later = session.create_entity("test.Resource").unwrap();
        buffer.discard_committed(&committed);

        assert_eq!(buffer.head_count(), 1);
        assert_eq!(buffer.tail_count(), 0);
        assert!(!buffer.is_part_of_commit(&first));
        assert!(buffer.is_part_of_commit(&later));

        buffer.undo().unwrap();
        assert!(!session.contains(&later));
        assert!(session.contains(&first));
    }

    #[test]
    fn test_suspended_tracking_ignores_manipulations() {
        let (session, buffer) = setup();
        {
            let _guard = buffer.replicate();
            assert!(buffer.is_replicating());
            session.create_entity("test.Resource").unwrap();
        }
        assert!(!buffer.is_replicating());
        assert!(buffer.is_tracking());
        assert_eq!(buffer.total_count(), 0);
    }

    #[test]
    fn test_listeners_see_added_and_removed() {
        let (session, buffer) = setup();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        buffer.add_listener(move |event| {
            let tag = match event {
                BufferEvent::Added(_) => "added",
                BufferEvent::Removed(_) => "removed",
                BufferEvent::Replaced { .. } => "replaced",
                BufferEvent::Cleared => "cleared",
            };
            sink.borrow_mut().push(tag);
        });

        session.create_entity("test.Resource").unwrap();
        buffer.undo().unwrap();
        buffer.redo().unwrap();
        buffer.clear();
        assert_eq!(*events.borrow(), vec!["added", "removed", "added", "cleared"]);
    }

    #[test]
    fn test_state_snapshot() {
        let (session, buffer) = setup();
        session.create_entity("test.Resource").unwrap();
        session.create_entity("test.Resource").unwrap();
        buffer.undo().unwrap();
        assert_eq!(
            buffer.state(),
            BufferState {
                can_undo: true,
                can_redo: true,
                can_commit: true,
                undo_count: 1,
                redo_count: 1,
            }
        );
    }
}
