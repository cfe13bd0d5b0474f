//! Event objects and listener bookkeeping.

use crate::NodeId;
use core::fmt;

/// Fired at the document node whenever its ready state advances.
pub const READY_STATE_CHANGE_EVENT: &str = "readystatechange";

/// Event travelling through the tree during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    event_type: String,
    bubbles: bool,
    target: Option<NodeId>,
    current_target: Option<NodeId>,
    propagation_stopped: bool,
}

impl Event {
    /// Non-bubbling event.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            bubbles: false,
            target: None,
            current_target: None,
            propagation_stopped: false,
        }
    }

    pub fn bubbling(event_type: impl Into<String>) -> Self {
        Self {
            bubbles: true,
            ..Self::new(event_type)
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    /// Node the event was dispatched at; `None` before dispatch.
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Node whose listeners are currently running.
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub(crate) fn begin_dispatch(&mut self, target: NodeId) {
        self.target = Some(target);
        self.current_target = None;
        self.propagation_stopped = false;
    }

    pub(crate) fn set_current_target(&mut self, node: Option<NodeId>) {
        self.current_target = node;
    }
}

/// Registration flags for a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Unregister the listener right before its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}

/// Handle returned by listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type ListenerCallback = Box<dyn FnMut(&Event)>;

struct Listener {
    id: ListenerId,
    target: NodeId,
    event_type: String,
    once: bool,
    callback: ListenerCallback,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub(crate) fn add(
        &mut self,
        target: NodeId,
        event_type: &str,
        options: ListenerOptions,
        callback: ListenerCallback,
    ) -> ListenerId {
        self.next_id = self.next_id.saturating_add(1);
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            target,
            event_type: event_type.to_owned(),
            once: options.once,
            callback,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        before != self.listeners.len()
    }

    pub(crate) fn count(&self, target: NodeId, event_type: &str) -> usize {
        self.listeners
            .iter()
            .filter(|listener| listener.target == target && listener.event_type == event_type)
            .count()
    }

    /// Runs the listeners registered on `node` at the time the call starts.
    pub(crate) fn invoke(&mut self, node: NodeId, event: &Event) {
        let matching: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|listener| listener.target == node && listener.event_type == event.event_type)
            .map(|listener| listener.id)
            .collect();

        for id in matching {
            let Some(index) = self.listeners.iter().position(|listener| listener.id == id) else {
                continue;
            };

            if self.listeners[index].once {
                let mut listener = self.listeners.remove(index);
                (listener.callback)(event);
            } else {
                (self.listeners[index].callback)(event);
            }
        }
    }
}
