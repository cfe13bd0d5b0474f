//! Animation-frame callback queue.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

/// Frame requests waiting for the next [`FrameQueue::take_due`].
#[derive(Debug)]
pub(crate) struct FrameQueue<T> {
    next_id: u64,
    queued: VecDeque<(FrameId, T)>,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            queued: VecDeque::new(),
        }
    }
}

impl<T> FrameQueue<T> {
    pub(crate) fn request(&mut self, task: T) -> FrameId {
        self.next_id = self.next_id.saturating_add(1);
        let id = FrameId(self.next_id);
        self.queued.push_back((id, task));
        id
    }

    pub(crate) fn cancel(&mut self, id: FrameId) -> bool {
        let before = self.queued.len();
        self.queued.retain(|(queued, _)| *queued != id);
        before != self.queued.len()
    }

    /// Everything requested so far. Requests made while the returned tasks
    /// run belong to the following frame.
    pub(crate) fn take_due(&mut self) -> Vec<(FrameId, T)> {
        self.queued.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.queued.len()
    }
}
