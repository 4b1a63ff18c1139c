//! TCAP dialogue tracking.
//!
//! Matches BEGIN/CONTINUE/END/ABORT messages (and ANSI packages) into dialogues, detects
//! retransmissions and transaction-id reuse, and measures the session time of every dialogue.
//! Most of this module's functionality is driven through [TcapTracker](TcapTracker); the key
//! types and [Context](context::Context) are public for inspection.

pub(crate) mod chain;
pub mod context;
pub mod dialogue_id;
pub mod message;

pub use self::context::{Context, DialogueState, SessionId};
pub use self::dialogue_id::{
    AnsiKey, BeginKey, ContKey, EndKey, PcHash, PointCode, SignalingAddr,
};
pub use self::message::{capture_time, Role, TcapMessage};

use self::chain::RoleIndex;
use self::context::ContextStore;
use crate::config::{TcapConfig, MAX_TIMEOUT};
use crate::srt::{SrtCategory, SrtResult};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Receives dialogue terminations detected outside of TC-END/TC-ABORT handling.
///
/// A lower or upper protocol layer that learns a dialogue is over (for instance a CAMEL release
/// operation) reports it here with the dialogue's session id.
pub trait DialogueCloseObserver {
    /// Closes dialogue `session_id` at `frame`. Returns `false` if the dialogue is unknown or
    /// already closed.
    fn dialogue_closed(
        &mut self,
        session_id: SessionId,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> bool;
}

/// Correlation result for one TCAP message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcapSrtInfo {
    /// Role of the message.
    pub role: Role,
    /// Frame of the message.
    pub frame: u32,
    /// Session category result.
    pub srt: SrtResult,
    /// `true` if this message closed its dialogue.
    pub closed: bool,
    /// Application context name of the dialogue.
    pub application_context: Option<String>,
}

impl TcapSrtInfo {
    fn new(msg: &TcapMessage, session_id: Option<SessionId>) -> Self {
        TcapSrtInfo {
            role: msg.role,
            frame: msg.frame,
            srt: SrtResult::new(session_id, SrtCategory::Session),
            closed: false,
            application_context: None,
        }
    }

    fn unmatched(msg: &TcapMessage) -> Self {
        Self::new(msg, None)
    }

    /// Correlation handle of the dialogue, `None` for orphan messages.
    #[inline]
    pub fn session_id(&self) -> Option<SessionId> {
        self.srt.session_id
    }
}

/// Manages state for all TCAP dialogues of an analysis run.
///
/// One `TcapTracker` is used per capture. It is configured with the repetition and lost-message
/// timeouts that decide whether a reused transaction id starts a new dialogue, and with the
/// persistence mode. See [TcapConfig](crate::config::TcapConfig) for details.
pub struct TcapTracker {
    /// Configuration
    config: TrackerConfig,
    /// Owns every live dialogue.
    contexts: ContextStore,
    /// BEGIN originating transaction id to dialogues.
    begin: RoleIndex<BeginKey>,
    /// CONTINUE transaction-id pair to dialogues.
    cont: RoleIndex<ContKey>,
    /// END/ABORT destination transaction id to dialogues.
    end: RoleIndex<EndKey>,
    /// ANSI transaction id to dialogues.
    ansi: RoleIndex<AnsiKey>,
}

impl TcapTracker {
    /// Creates a new `TcapTracker`.
    pub fn new(config: &TcapConfig) -> Self {
        TcapTracker {
            config: TrackerConfig::from(config),
            contexts: ContextStore::new(),
            begin: RoleIndex::new("begin"),
            cont: RoleIndex::new("cont"),
            end: RoleIndex::new("end"),
            ansi: RoleIndex::new("ansi"),
        }
    }

    /// Drops every dialogue and restarts session ids at 1. Call once per new capture.
    pub fn run_reset(&mut self) {
        log::debug!("Resetting TCAP dialogue tables");
        self.contexts.clear();
        self.begin.clear();
        self.cont.clear();
        self.end.clear();
        self.ansi.clear();
    }

    /// Process a single decoded message `msg`.
    pub fn process(&mut self, msg: &TcapMessage) -> TcapSrtInfo {
        if !self.config.handle_srt {
            return TcapSrtInfo::unmatched(msg);
        }
        let mut info = match msg.role {
            Role::Begin => self.begin_matching(msg),
            Role::Continue => self.cont_matching(msg),
            Role::End | Role::Abort => self.end_matching(msg),
            Role::AnsiQuery | Role::AnsiConversation | Role::AnsiResponse | Role::AnsiAbort => {
                self.ansi_matching(msg)
            }
        };
        if let Some(session_id) = info.session_id() {
            if info.application_context.is_none() {
                info.application_context = self.application_context(session_id, msg);
            }
        }
        self.report(&info);
        info
    }

    /// Terminates dialogue `session_id` at `frame`.
    ///
    /// Marks the dialogue responded and closed. Unless the tracker is persistent, the dialogue and
    /// all its role index entries are released. Returns `false` if the dialogue is unknown or
    /// already closed.
    pub fn close_context(
        &mut self,
        session_id: SessionId,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let ctx = match self.contexts.get_mut(session_id) {
            Some(ctx) => ctx,
            None => {
                log::debug!("Close of unknown session {}", session_id);
                return false;
            }
        };
        if ctx.closed {
            return false;
        }
        ctx.responded = true;
        ctx.last_frame = Some(frame);
        ctx.end_time = Some(timestamp);
        ctx.closed = true;
        log::debug!("Session {} closed at frame {}", session_id, frame);
        if !self.config.persistent {
            self.evict(session_id);
        }
        true
    }

    /// Returns dialogue `session_id`, if still tracked.
    pub fn context(&self, session_id: SessionId) -> Option<&Context> {
        self.contexts.get(session_id)
    }

    /// Returns all tracked dialogues in creation order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.iter()
    }

    /// Returns the number of tracked dialogues.
    #[inline]
    pub fn size(&self) -> usize {
        self.contexts.len()
    }

    /// Returns the number of entries across all role indices.
    pub fn nb_index_entries(&self) -> usize {
        self.begin.nb_nodes() + self.cont.nb_nodes() + self.end.nb_nodes() + self.ansi.nb_nodes()
    }

    /// Returns the number of distinct keys across all role indices.
    pub fn nb_keys(&self) -> usize {
        self.begin.len() + self.cont.len() + self.end.len() + self.ansi.len()
    }

    /// Returns `true` if closed dialogues are kept.
    #[inline]
    pub fn persistent(&self) -> bool {
        self.config.persistent
    }

    /// Looks up the dialogue a message at `frame` with BEGIN key `key` belongs to.
    pub fn find_begin(&mut self, key: &BeginKey, frame: u32) -> Option<SessionId> {
        let contexts = &self.contexts;
        self.begin
            .find_by_time(key, frame, |sid| contexts.range(sid))
    }

    /// Looks up the dialogue a message at `frame` with CONTINUE key `key` belongs to.
    pub fn find_cont(&mut self, key: &ContKey, frame: u32) -> Option<SessionId> {
        let contexts = &self.contexts;
        self.cont.find_by_time(key, frame, |sid| contexts.range(sid))
    }

    /// Looks up the dialogue a message at `frame` with END key `key` belongs to.
    pub fn find_end(&mut self, key: &EndKey, frame: u32) -> Option<SessionId> {
        let contexts = &self.contexts;
        self.end.find_by_time(key, frame, |sid| contexts.range(sid))
    }

    fn new_context(&mut self, msg: &TcapMessage) -> SessionId {
        self.contexts.create(msg.frame, msg.timestamp)
    }

    /// Unlinks dialogue `session_id` from every role index and drops it.
    fn evict(&mut self, session_id: SessionId) {
        let ctx = match self.contexts.remove(session_id) {
            Some(ctx) => ctx,
            None => return,
        };
        if let Some(key) = ctx.begin_key {
            self.begin.remove(&key, session_id);
        }
        if let Some(key) = ctx.cont_key {
            self.cont.remove(&key, session_id);
        }
        if let Some(key) = ctx.end_key {
            self.end.remove(&key, session_id);
        }
        if let Some(key) = ctx.ansi_key {
            self.ansi.remove(&key, session_id);
        }
    }

    /// Returns `true` if a message at `frame`, `timestamp` reusing the key of dialogue `previous`
    /// starts a new dialogue rather than repeating the previous opening message.
    fn is_new_dialogue(&self, previous: &Context, frame: u32, timestamp: DateTime<Utc>) -> bool {
        if frame <= previous.first_frame {
            return false;
        }
        let elapsed = timestamp - previous.begin_time;
        match previous.state() {
            // re-dissection of a frame seen while the dialogue was still alive
            DialogueState::Closed if previous.covers(frame) => {
                elapsed >= self.config.repetition_timeout
            }
            DialogueState::Closed => true,
            DialogueState::Responded => elapsed >= self.config.repetition_timeout,
            DialogueState::Open => elapsed >= self.config.lost_timeout,
        }
    }

    fn begin_matching(&mut self, msg: &TcapMessage) -> TcapSrtInfo {
        let key = BeginKey::new(msg.src_tid, &msg.src, &msg.dst);
        let seen = self
            .begin
            .lookup_chain(&key)
            .and_then(|chain| chain.find_first_frame(msg.frame))
            .map(|node| node.session_id);
        if let Some(session_id) = seen {
            // seen this BEGIN before
            return TcapSrtInfo::new(msg, Some(session_id));
        }

        // latest dialogue opened before this frame, not necessarily the chain tail on re-dissection
        let previous = self.find_begin(&key, msg.frame);
        if let Some(previous) = previous.and_then(|sid| self.contexts.get(sid)) {
            if !self.is_new_dialogue(previous, msg.frame, msg.timestamp) {
                log::debug!(
                    "Frame {}: duplicate BEGIN of session {} ({})",
                    msg.frame,
                    previous.session_id,
                    key
                );
                let mut info = TcapSrtInfo::new(msg, Some(previous.session_id));
                info.srt.is_duplicate = true;
                info.srt.request_frame = Some(previous.first_frame);
                return info;
            }
        }

        let session_id = self.new_context(msg);
        self.begin.insert(key, session_id, msg.frame);
        if let Some(ctx) = self.contexts.get_mut(session_id) {
            ctx.begin_key = Some(key);
        }
        TcapSrtInfo::new(msg, Some(session_id))
    }

    fn cont_matching(&mut self, msg: &TcapMessage) -> TcapSrtInfo {
        let key = ContKey::new(msg.src_tid, msg.dst_tid, &msg.src, &msg.dst);
        let found = self
            .find_cont(&key, msg.frame)
            .filter(|sid| self.contexts.get(*sid).map_or(false, |c| c.covers(msg.frame)));
        let session_id = match found.or_else(|| self.bind_continue(msg, key)) {
            Some(session_id) => session_id,
            None => {
                log::debug!("Frame {}: orphan CONTINUE ({})", msg.frame, key);
                return TcapSrtInfo::unmatched(msg);
            }
        };
        let mut info = TcapSrtInfo::new(msg, Some(session_id));
        if let Some(ctx) = self.contexts.get(session_id) {
            info.srt.request_available = true;
            info.srt.request_frame = Some(ctx.first_frame);
        }
        info
    }

    /// Binds the first CONTINUE of a dialogue to the dialogue opened by the matching BEGIN.
    ///
    /// The BEGIN is looked up by the CONTINUE's destination transaction id, then by its originating
    /// one when the initiator continues before the responder was observed. The dialogue gets a
    /// CONTINUE entry and an END entry for the transaction id the initiator will address.
    fn bind_continue(&mut self, msg: &TcapMessage, cont_key: ContKey) -> Option<SessionId> {
        for tid in [msg.dst_tid, msg.src_tid] {
            let begin_key = BeginKey::new(tid, &msg.src, &msg.dst);
            let session_id = match self.find_begin(&begin_key, msg.frame) {
                Some(session_id) => session_id,
                None => continue,
            };
            let ctx = match self.contexts.get_mut(session_id) {
                Some(ctx) => ctx,
                None => continue,
            };
            if ctx.cont_key.is_some() || !ctx.covers(msg.frame) {
                continue;
            }
            let end_key = EndKey::new(msg.src_tid, &msg.src, &msg.dst);
            ctx.responded = true;
            ctx.cont_key = Some(cont_key);
            ctx.end_key = Some(end_key);
            let first_frame = ctx.first_frame;
            self.cont.insert(cont_key, session_id, first_frame);
            self.end.insert(end_key, session_id, first_frame);
            log::debug!(
                "Frame {}: CONTINUE bound to session {} ({})",
                msg.frame,
                session_id,
                begin_key
            );
            return Some(session_id);
        }
        None
    }

    fn end_matching(&mut self, msg: &TcapMessage) -> TcapSrtInfo {
        let end_key = EndKey::new(msg.dst_tid, &msg.src, &msg.dst);
        let begin_key = BeginKey::new(msg.dst_tid, &msg.src, &msg.dst);
        let candidates = [
            self.find_end(&end_key, msg.frame),
            self.find_begin(&begin_key, msg.frame),
        ];

        // prefer an open dialogue, or the one this very frame closed (re-dissection)
        let mut closed_candidate = None;
        let mut resolved = None;
        for session_id in candidates.iter().flatten() {
            if let Some(ctx) = self.contexts.get(*session_id) {
                if !ctx.closed || ctx.last_frame == Some(msg.frame) {
                    resolved = Some(*session_id);
                    break;
                }
                closed_candidate.get_or_insert(*session_id);
            }
        }

        let session_id = match (resolved, closed_candidate) {
            (Some(session_id), _) => session_id,
            (None, Some(session_id)) => {
                log::debug!(
                    "Frame {}: {} on closed session {}",
                    msg.frame,
                    msg.role,
                    session_id
                );
                let mut info = TcapSrtInfo::new(msg, Some(session_id));
                info.srt.is_duplicate = true;
                if let Some(ctx) = self.contexts.get(session_id) {
                    info.srt.request_frame = Some(ctx.first_frame);
                    info.srt.response_frame = ctx.last_frame;
                }
                return info;
            }
            (None, None) => {
                log::debug!("Frame {}: orphan {} ({})", msg.frame, msg.role, end_key);
                return TcapSrtInfo::unmatched(msg);
            }
        };
        self.close_with(msg, session_id)
    }

    /// Reports the session time of dialogue `session_id` and closes it with message `msg`.
    fn close_with(&mut self, msg: &TcapMessage, session_id: SessionId) -> TcapSrtInfo {
        let mut info = TcapSrtInfo::new(msg, Some(session_id));
        let (first_frame, begin_time, already_closed) = match self.contexts.get(session_id) {
            Some(ctx) => (ctx.first_frame, ctx.begin_time, ctx.closed),
            None => return info,
        };
        info.srt.request_available = true;
        info.srt.request_frame = Some(first_frame);
        info.srt.delta_time = Some(msg.timestamp - begin_time);
        info.application_context = self.application_context(session_id, msg);
        if !already_closed {
            info.closed = self.close_context(session_id, msg.frame, msg.timestamp);
        }
        info
    }

    fn ansi_matching(&mut self, msg: &TcapMessage) -> TcapSrtInfo {
        let key = AnsiKey::new(msg.src_tid, &msg.src, &msg.dst);
        let tail = match self.ansi.lookup_chain(&key) {
            None => None,
            Some(chain) => {
                if let Some(node) = chain.find_first_frame(msg.frame) {
                    return TcapSrtInfo::new(msg, Some(node.session_id));
                }
                chain.tail().map(|node| node.session_id)
            }
        };

        let previous = tail.and_then(|sid| self.contexts.get(sid));
        let attach_to = match previous {
            Some(previous) => {
                let new_dialogue = msg.role == Role::AnsiQuery
                    && self.is_new_dialogue(previous, msg.frame, msg.timestamp);
                if new_dialogue {
                    None
                } else {
                    Some(previous.session_id)
                }
            }
            None => None,
        };

        let session_id = match attach_to {
            Some(session_id) => session_id,
            None => {
                let session_id = self.new_context(msg);
                self.ansi.insert(key, session_id, msg.frame);
                if let Some(ctx) = self.contexts.get_mut(session_id) {
                    ctx.ansi_key = Some(key);
                }
                return TcapSrtInfo::new(msg, Some(session_id));
            }
        };

        let ctx = match self.contexts.get_mut(session_id) {
            Some(ctx) => ctx,
            None => return TcapSrtInfo::unmatched(msg),
        };
        if msg.role == Role::AnsiQuery || (ctx.closed && ctx.last_frame != Some(msg.frame)) {
            // repeated query, or a package after the transaction ended
            let mut info = TcapSrtInfo::new(msg, Some(session_id));
            info.srt.is_duplicate = true;
            info.srt.request_frame = Some(ctx.first_frame);
            info.srt.response_frame = ctx.last_frame;
            return info;
        }
        ctx.responded = true;
        if msg.role.terminates() {
            return self.close_with(msg, session_id);
        }
        let mut info = TcapSrtInfo::new(msg, Some(session_id));
        info.srt.request_available = true;
        info.srt.request_frame = Some(ctx.first_frame);
        info.srt.delta_time = Some(msg.timestamp - ctx.begin_time);
        info
    }

    /// Records the first application context seen for the dialogue and returns the dialogue's one.
    fn application_context(
        &mut self,
        session_id: SessionId,
        msg: &TcapMessage,
    ) -> Option<String> {
        match self.contexts.get_mut(session_id) {
            Some(ctx) => {
                if ctx.application_context.is_none() {
                    ctx.application_context = msg.application_context.clone();
                }
                ctx.application_context.clone()
            }
            // evicted on close: fall back to what the message carried
            None => msg.application_context.clone(),
        }
    }

    fn report(&self, info: &TcapSrtInfo) {
        if !self.config.display {
            return;
        }
        let srt = &info.srt;
        match srt.session_id {
            None => log::info!("Frame {}: {} without dialogue", info.frame, info.role),
            Some(session_id) if srt.is_duplicate => log::info!(
                "Frame {}: duplicate {} of session {} (begin in frame {:?})",
                info.frame,
                info.role,
                session_id,
                srt.request_frame
            ),
            Some(session_id) => match (srt.request_frame, srt.delta_time) {
                (Some(begin), Some(delta)) => log::info!(
                    "Frame {}: session {} begin in frame {}, session time {:.9}s",
                    info.frame,
                    session_id,
                    begin,
                    crate::srt::duration_secs(delta)
                ),
                (Some(begin), None) => log::info!(
                    "Frame {}: session {} begin in frame {}",
                    info.frame,
                    session_id,
                    begin
                ),
                _ => log::info!("Frame {}: session {}", info.frame, session_id),
            },
        }
    }
}

impl DialogueCloseObserver for TcapTracker {
    fn dialogue_closed(
        &mut self,
        session_id: SessionId,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.close_context(session_id, frame, timestamp)
    }
}

/// Configurable options for a `TcapTracker`.
#[derive(Debug, Clone)]
pub(crate) struct TrackerConfig {
    /// Whether messages are correlated at all.
    pub(crate) handle_srt: bool,
    /// Keep closed dialogues in the tables.
    pub(crate) persistent: bool,
    /// Age after which a responded dialogue's transaction id may be reused.
    pub(crate) repetition_timeout: Duration,
    /// Age after which an unresponded dialogue is considered lost.
    pub(crate) lost_timeout: Duration,
    /// Log per-message annotations.
    pub(crate) display: bool,
}

impl From<&TcapConfig> for TrackerConfig {
    fn from(config: &TcapConfig) -> Self {
        TrackerConfig {
            handle_srt: config.handle_srt,
            persistent: config.persistent,
            repetition_timeout: Duration::seconds(
                config.repetition_timeout.min(MAX_TIMEOUT) as i64,
            ),
            lost_timeout: Duration::seconds(config.lost_timeout.min(MAX_TIMEOUT) as i64),
            display: config.display,
        }
    }
}
