//! Fire-once gate shared by the two triggers of a deferred render.

use crate::frames::FrameId;
use rl_dom::ListenerId;

/// Which trigger woke a deferred render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ReadyStateChange,
    AnimationFrame,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyStateChange => "readystatechange",
            Self::AnimationFrame => "animation-frame",
        }
    }
}

/// Registration the caller must undo after the gate fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    Frame(FrameId),
    Listener(ListenerId),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderGate {
    Armed {
        frame: Option<FrameId>,
        listener: Option<ListenerId>,
    },
    Fired,
}

impl RenderGate {
    pub fn armed(frame: FrameId, listener: ListenerId) -> Self {
        Self::Armed {
            frame: Some(frame),
            listener: Some(listener),
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }

    /// Closes the gate on behalf of `by`. Returns the other trigger's
    /// registration, or `None` if the gate had already fired.
    pub fn fire(&mut self, by: Trigger) -> Option<Cancellation> {
        let Self::Armed { frame, listener } = *self else {
            return None;
        };
        *self = Self::Fired;

        let cancellation = match by {
            Trigger::ReadyStateChange => frame.map(Cancellation::Frame),
            Trigger::AnimationFrame => listener.map(Cancellation::Listener),
        };
        Some(cancellation.unwrap_or(Cancellation::Nothing))
    }

    /// Forgets a frame that ran without firing the gate.
    pub fn spend_frame(&mut self, spent: FrameId) {
        if let Self::Armed { frame, .. } = self
            && *frame == Some(spent)
        {
            *frame = None;
        }
    }

    pub fn frame(&self) -> Option<FrameId> {
        match self {
            Self::Armed { frame, .. } => *frame,
            Self::Fired => None,
        }
    }
}
