//! Per-dialogue state.
//!
//! A [Context](Context) is created once per logical dialogue and shared by every role index entry
//! that refers to it. Role index entries hold the context's session id, never the context itself.

use super::dialogue_id::{AnsiKey, BeginKey, ContKey, EndKey};

use chrono::{DateTime, Utc};
use hashlink::LinkedHashMap;
use serde::Serialize;

/// Externally visible correlation handle of a dialogue.
pub type SessionId = u32;

/// Lifecycle stage of a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DialogueState {
    /// Opened, no counterpart observed yet.
    Open,
    /// A CONTINUE, END or ABORT counterpart has been observed.
    Responded,
    /// Terminated, explicitly or through the close hook.
    Closed,
}

/// Dialogue state.
#[derive(Debug, Clone, Serialize)]
pub struct Context {
    /// Correlation handle, unique within a run.
    pub session_id: SessionId,
    /// Frame of the message that opened the dialogue.
    pub first_frame: u32,
    /// Frame of the message that closed the dialogue, `None` while open.
    pub last_frame: Option<u32>,
    /// Capture time of the opening message.
    pub begin_time: DateTime<Utc>,
    /// Capture time of the closing message.
    pub end_time: Option<DateTime<Utc>>,
    /// `true` once a counterpart message has been seen.
    pub responded: bool,
    /// `true` once the dialogue is terminated.
    pub closed: bool,
    /// Application context name of the dialogue, from the first dialogue portion seen.
    pub application_context: Option<String>,
    pub(crate) begin_key: Option<BeginKey>,
    pub(crate) cont_key: Option<ContKey>,
    pub(crate) end_key: Option<EndKey>,
    pub(crate) ansi_key: Option<AnsiKey>,
}

impl Context {
    fn new(session_id: SessionId, first_frame: u32, begin_time: DateTime<Utc>) -> Self {
        Context {
            session_id,
            first_frame,
            last_frame: None,
            begin_time,
            end_time: None,
            responded: false,
            closed: false,
            application_context: None,
            begin_key: None,
            cont_key: None,
            end_key: None,
            ansi_key: None,
        }
    }

    /// Returns the lifecycle stage of the dialogue.
    pub fn state(&self) -> DialogueState {
        if self.closed {
            DialogueState::Closed
        } else if self.responded {
            DialogueState::Responded
        } else {
            DialogueState::Open
        }
    }

    /// Returns `true` if `frame` falls within the observed lifetime of the dialogue.
    #[inline]
    pub fn covers(&self, frame: u32) -> bool {
        frame >= self.first_frame && self.last_frame.map_or(true, |last| frame <= last)
    }

    /// Returns the observed frame range of the dialogue.
    #[inline]
    pub(crate) fn range(&self) -> (u32, Option<u32>) {
        (self.first_frame, self.last_frame)
    }
}

/// Monotonic session id generator.
///
/// Ids start at 1 after every reset. Overflow wraps and is not handled further.
#[derive(Debug)]
pub(crate) struct SessionCounter {
    next: SessionId,
}

impl SessionCounter {
    pub(crate) fn new() -> Self {
        SessionCounter { next: 1 }
    }

    pub(crate) fn next_id(&mut self) -> SessionId {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    pub(crate) fn reset(&mut self) {
        self.next = 1;
    }
}

/// Owns every live context of a run, keyed by session id.
pub(crate) struct ContextStore {
    /// Contexts in creation order.
    contexts: LinkedHashMap<SessionId, Context>,
    /// Source of session ids.
    counter: SessionCounter,
}

impl ContextStore {
    pub(crate) fn new() -> Self {
        ContextStore {
            contexts: LinkedHashMap::new(),
            counter: SessionCounter::new(),
        }
    }

    /// Allocates a context for a dialogue opened at `frame`.
    pub(crate) fn create(&mut self, frame: u32, begin_time: DateTime<Utc>) -> SessionId {
        let session_id = self.counter.next_id();
        log::debug!("New context {} at frame {}", session_id, frame);
        self.contexts
            .insert(session_id, Context::new(session_id, frame, begin_time));
        session_id
    }

    #[inline]
    pub(crate) fn get(&self, session_id: SessionId) -> Option<&Context> {
        self.contexts.get(&session_id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, session_id: SessionId) -> Option<&mut Context> {
        self.contexts.get_mut(&session_id)
    }

    /// Returns the frame range of context `session_id`.
    #[inline]
    pub(crate) fn range(&self, session_id: SessionId) -> Option<(u32, Option<u32>)> {
        self.get(session_id).map(Context::range)
    }

    pub(crate) fn remove(&mut self, session_id: SessionId) -> Option<Context> {
        self.contexts.remove(&session_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.contexts.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// Drops every context and restarts session ids at 1.
    pub(crate) fn clear(&mut self) {
        self.contexts.clear();
        self.counter.reset();
    }
}
