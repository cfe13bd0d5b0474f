//! Single-threaded page runtime that decides when a layout render runs.
//!
//! A render requested before the body looks ready is deferred behind two
//! one-shot triggers: the next `readystatechange` of the document and the
//! next animation frame. Whichever fires first with a go-ahead performs the
//! render and unregisters the other one.

mod frames;
mod gate;

pub use frames::FrameId;
pub use gate::Cancellation;
pub use gate::RenderGate;
pub use gate::Trigger;

use frames::FrameQueue;
use rl_compose::CompositionReport;
use rl_compose::LayoutSource;
use rl_compose::compose;
use rl_compose::is_ready;
use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_dom::Document;
use rl_dom::ListenerOptions;
use rl_dom::READY_STATE_CHANGE_EVENT;
use rl_dom::ReadyState;
use rl_html::HtmlParser;
use std::cell::RefCell;
use std::rc::Rc;

/// Identifies one deferred render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(CompositionReport),
    Deferred(RenderTicket),
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }
}

#[derive(Debug)]
struct PendingRender {
    ticket: RenderTicket,
    source: LayoutSource,
    gate: RenderGate,
}

/// A document plus the event-loop state needed to drive deferred renders.
#[derive(Debug)]
pub struct Page {
    document: Document,
    frames: FrameQueue<RenderTicket>,
    pending: Vec<PendingRender>,
    woken: Rc<RefCell<Vec<RenderTicket>>>,
    next_ticket: u64,
}

impl Page {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            frames: FrameQueue::default(),
            pending: Vec::new(),
            woken: Rc::new(RefCell::new(Vec::new())),
            next_ticket: 0,
        }
    }

    pub fn parse(html: &str) -> LayoutResult<Self> {
        Ok(Self::new(HtmlParser.parse_document(html)?))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Renders still waiting for a trigger.
    pub fn pending_renders(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    /// Composes now when the body looks ready, otherwise defers.
    pub fn render_layout(&mut self, source: impl Into<LayoutSource>) -> LayoutResult<RenderOutcome> {
        let source = source.into();
        if is_ready(&self.document) {
            return compose(&mut self.document, source).map(RenderOutcome::Rendered);
        }

        self.next_ticket = self.next_ticket.saturating_add(1);
        let ticket = RenderTicket(self.next_ticket);

        let woken = Rc::clone(&self.woken);
        let root = self.document.root();
        let listener = self.document.add_event_listener(
            root,
            READY_STATE_CHANGE_EVENT,
            ListenerOptions::once(),
            move |_| woken.borrow_mut().push(ticket),
        );
        let frame = self.frames.request(ticket);

        self.pending.push(PendingRender {
            ticket,
            source,
            gate: RenderGate::armed(frame, listener),
        });
        tracing::debug!(ticket = ticket.0, "layout render deferred until the body is ready");
        Ok(RenderOutcome::Deferred(ticket))
    }

    /// Advances the document ready state. Renders woken by the resulting
    /// `readystatechange` run unconditionally.
    pub fn set_ready_state(&mut self, state: ReadyState) -> LayoutResult<Vec<CompositionReport>> {
        self.document.set_ready_state(state)?;

        let woken = std::mem::take(&mut *self.woken.borrow_mut());
        let mut reports = Vec::new();
        let mut failure = None;
        for ticket in woken {
            let Some(index) = self.pending_index(ticket) else {
                continue;
            };
            let Some(cancellation) = self.pending[index].gate.fire(Trigger::ReadyStateChange)
            else {
                continue;
            };
            self.cancel(cancellation);

            let pending = self.pending.remove(index);
            self.collect(pending, Trigger::ReadyStateChange, &mut reports, &mut failure);
        }

        failure.map_or(Ok(reports), Err)
    }

    /// Runs the frame callbacks queued so far. A render whose frame arrives
    /// while the body is still not ready keeps waiting for `readystatechange`
    /// only; no new frame is requested.
    pub fn run_animation_frame(&mut self) -> LayoutResult<Vec<CompositionReport>> {
        let mut reports = Vec::new();
        let mut failure = None;
        for (frame, ticket) in self.frames.take_due() {
            let Some(index) = self.pending_index(ticket) else {
                continue;
            };
            if self.pending[index].gate.frame() != Some(frame) {
                continue;
            }

            if !is_ready(&self.document) {
                self.pending[index].gate.spend_frame(frame);
                tracing::trace!(ticket = ticket.0, "animation frame found body not ready");
                continue;
            }

            let Some(cancellation) = self.pending[index].gate.fire(Trigger::AnimationFrame) else {
                continue;
            };
            self.cancel(cancellation);

            let pending = self.pending.remove(index);
            self.collect(pending, Trigger::AnimationFrame, &mut reports, &mut failure);
        }

        failure.map_or(Ok(reports), Err)
    }

    fn pending_index(&self, ticket: RenderTicket) -> Option<usize> {
        self.pending
            .iter()
            .position(|pending| pending.ticket == ticket)
    }

    fn cancel(&mut self, cancellation: Cancellation) {
        match cancellation {
            Cancellation::Frame(frame) => {
                self.frames.cancel(frame);
            }
            Cancellation::Listener(listener) => {
                self.document.remove_event_listener(listener);
            }
            Cancellation::Nothing => {}
        }
    }

    /// Every fired render has already lost its other trigger, so a failure
    /// is held until the remaining ones have run. The first error wins.
    fn collect(
        &mut self,
        pending: PendingRender,
        trigger: Trigger,
        reports: &mut Vec<CompositionReport>,
        failure: &mut Option<LayoutError>,
    ) {
        match self.run(pending, trigger) {
            Ok(report) => reports.push(report),
            Err(error) => {
                tracing::warn!(code = error.code, "deferred layout render failed");
                failure.get_or_insert(error);
            }
        }
    }

    fn run(&mut self, pending: PendingRender, trigger: Trigger) -> LayoutResult<CompositionReport> {
        tracing::debug!(
            ticket = pending.ticket.0,
            trigger = trigger.as_str(),
            "deferred layout render fired"
        );
        compose(&mut self.document, pending.source)
    }
}
