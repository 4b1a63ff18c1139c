//! CAMEL operation matching.
//!
//! Pairs CAMEL operations carried in TCAP dialogues (InitialDP with Continue, ApplyChargingReport
//! with ApplyCharging, ...) into [categories](crate::srt::SrtCategory) and measures the response
//! time of each pair. Dialogues are resolved by an inner [TcapTracker](crate::tcaptrack::TcapTracker),
//! whose session id keys the CAMEL [call record](call::CamelCall).

pub mod call;
pub mod operation;

pub use self::call::{CamelCall, CategorySlot};
pub use self::operation::{Operation, SrtAction};

use crate::config::{CamelConfig, SrtConfig};
use crate::srt::{SrtCategory, SrtResult};
use crate::tcaptrack::{
    DialogueCloseObserver, SessionId, TcapMessage, TcapSrtInfo, TcapTracker,
};

use chrono::{DateTime, Utc};
use hashlink::LinkedHashMap;
use serde::Serialize;

/// Correlation result for one message carrying a CAMEL component.
#[derive(Debug, Clone, Serialize)]
pub struct CamelSrtInfo {
    /// Operation code of the component, if any.
    pub opcode: Option<u8>,
    /// Operation, if it takes part in matching.
    pub operation: Option<Operation>,
    /// Dialogue level result.
    pub tcap: TcapSrtInfo,
    /// Per category results, indexed by [SrtCategory::index](crate::srt::SrtCategory::index).
    pub msginfo: [Option<SrtResult>; SrtCategory::COUNT],
}

impl CamelSrtInfo {
    fn new(opcode: Option<u8>, tcap: TcapSrtInfo) -> Self {
        CamelSrtInfo {
            opcode,
            operation: None,
            tcap,
            msginfo: [None; SrtCategory::COUNT],
        }
    }

    /// Returns the result recorded for `category`.
    pub fn get(&self, category: SrtCategory) -> Option<&SrtResult> {
        self.msginfo[category.index()].as_ref()
    }

    fn set(&mut self, result: SrtResult) {
        let index = result.category.index();
        debug_assert!(index < SrtCategory::COUNT, "category slot {} out of range", index);
        if let Some(slot) = self.msginfo.get_mut(index) {
            *slot = Some(result);
        }
    }

    /// Returns the results that carry a response time.
    pub fn matched(&self) -> impl Iterator<Item = &SrtResult> {
        self.msginfo
            .iter()
            .flatten()
            .filter(|r| r.delta_time.is_some())
    }

    /// Returns every result of the message.
    ///
    /// The dialogue result is included unless the CAMEL call already reported the session
    /// category.
    pub fn results(&self) -> impl Iterator<Item = &SrtResult> {
        let tcap = if self.get(SrtCategory::Session).is_none() {
            Some(&self.tcap.srt)
        } else {
            None
        };
        tcap.into_iter().chain(self.msginfo.iter().flatten())
    }

    /// Correlation handle of the dialogue.
    #[inline]
    pub fn session_id(&self) -> Option<SessionId> {
        self.tcap.session_id()
    }
}

/// Matches CAMEL operations on top of TCAP dialogues.
pub struct CamelTracker {
    /// Configuration
    options: CamelOptions,
    /// Resolves dialogues.
    tcap: TcapTracker,
    /// Call records by dialogue.
    calls: LinkedHashMap<SessionId, CamelCall>,
}

impl CamelTracker {
    /// Creates a new `CamelTracker`.
    pub fn new(config: &SrtConfig) -> Self {
        CamelTracker {
            options: CamelOptions::from(&config.camel),
            tcap: TcapTracker::new(&config.tcap),
            calls: LinkedHashMap::new(),
        }
    }

    /// Drops every call and dialogue. Call once per new capture.
    pub fn run_reset(&mut self) {
        self.tcap.run_reset();
        self.calls.clear();
    }

    /// Returns the inner dialogue tracker.
    pub fn tcap(&self) -> &TcapTracker {
        &self.tcap
    }

    /// Returns the call record of dialogue `session_id`.
    pub fn call(&self, session_id: SessionId) -> Option<&CamelCall> {
        self.calls.get(&session_id)
    }

    /// Returns the number of call records.
    #[inline]
    pub fn nb_calls(&self) -> usize {
        self.calls.len()
    }

    /// Process a single decoded message `msg`.
    pub fn process(&mut self, msg: &TcapMessage) -> CamelSrtInfo {
        let tcap = self.tcap.process(msg);
        let mut info = CamelSrtInfo::new(msg.opcode, tcap);
        if !self.options.handle_srt {
            return info;
        }
        let session_id = match info.tcap.session_id() {
            Some(session_id) => session_id,
            None => return info,
        };
        if let Some(opcode) = msg.opcode {
            self.match_operation(session_id, opcode, msg, &mut info);
        }
        if msg.role.terminates() && info.tcap.srt.delta_time.is_some() {
            if let Some(session) = self.close_call(session_id, msg.frame, msg.timestamp) {
                info.set(session);
            }
        }
        self.release(session_id);
        self.report(&info);
        info
    }

    fn match_operation(
        &mut self,
        session_id: SessionId,
        opcode: u8,
        msg: &TcapMessage,
        info: &mut CamelSrtInfo,
    ) {
        let operation = match Operation::from_opcode(opcode) {
            Some(operation) => operation,
            None => {
                log::debug!("Frame {}: opcode {} not matched", msg.frame, opcode);
                return;
            }
        };
        info.operation = Some(operation);
        let (frame, timestamp) = (msg.frame, msg.timestamp);
        for action in operation.actions() {
            let result = match *action {
                SrtAction::OpenCall => {
                    self.open_call(session_id, msg);
                    None
                }
                SrtAction::Request(category) => {
                    Some(self.open_call(session_id, msg).on_request(category, frame, timestamp))
                }
                SrtAction::AcrRequest => {
                    let call = self.open_call(session_id, msg);
                    let category = call.acr_request_slot(frame);
                    Some(call.on_request(category, frame, timestamp))
                }
                SrtAction::Response(category) => {
                    Some(self.open_call(session_id, msg).on_response(category, frame, timestamp))
                }
                SrtAction::AcrResponse => {
                    let call = self.open_call(session_id, msg);
                    let category = call.acr_response_slot(frame);
                    Some(call.on_response(category, frame, timestamp))
                }
                SrtAction::CloseCall => self.release_call(session_id, msg),
                SrtAction::CloseDialogue => {
                    if self.tcap.dialogue_closed(session_id, frame, timestamp) {
                        info.tcap.closed = true;
                    }
                    None
                }
            };
            // responses dropped for lack of a request leave no trace
            if let Some(result) = result.filter(|r| r.is_duplicate || r.request_frame.is_some()) {
                info.set(result);
            }
        }
    }

    /// Returns the call record of dialogue `session_id`, created from the dialogue's opening if
    /// absent.
    fn open_call(&mut self, session_id: SessionId, msg: &TcapMessage) -> &mut CamelCall {
        let tcap = &self.tcap;
        self.calls.entry(session_id).or_insert_with(|| {
            let (first_frame, begin_time) = tcap
                .context(session_id)
                .map_or((msg.frame, msg.timestamp), |ctx| (ctx.first_frame, ctx.begin_time));
            log::debug!(
                "New CAMEL call for session {} (begin in frame {})",
                session_id,
                first_frame
            );
            CamelCall::new(session_id, first_frame, begin_time)
        })
    }

    /// Closes the call record of dialogue `session_id` on a release operation.
    ///
    /// A release in a dialogue without call record still reports the session time from the
    /// dialogue's opening. A release repeated after the call closed is flagged duplicate.
    fn release_call(&mut self, session_id: SessionId, msg: &TcapMessage) -> Option<SrtResult> {
        let alive = self
            .tcap
            .context(session_id)
            .map_or(false, |ctx| !ctx.closed || ctx.last_frame == Some(msg.frame));
        if !alive && !self.calls.contains_key(&session_id) {
            return None;
        }
        let call = self.open_call(session_id, msg);
        match call.close(msg.frame, msg.timestamp) {
            Some(session) => Some(session),
            None => {
                log::debug!(
                    "Frame {}: duplicate release of session {} (closed in frame {:?})",
                    msg.frame,
                    session_id,
                    call.end_frame
                );
                let mut session = SrtResult::new(Some(session_id), SrtCategory::Session);
                session.is_duplicate = true;
                session.request_frame = Some(call.begin_frame);
                session.response_frame = call.end_frame;
                Some(session)
            }
        }
    }

    /// Closes the call record of dialogue `session_id` and reports its session time.
    ///
    /// Returns `None` if there is no call record or it was closed by another frame.
    fn close_call(
        &mut self,
        session_id: SessionId,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Option<SrtResult> {
        self.calls.get_mut(&session_id)?.close(frame, timestamp)
    }

    /// Drops the call record of dialogue `session_id` once the dialogue is over, unless persistent.
    fn release(&mut self, session_id: SessionId) {
        if self.options.persistent {
            return;
        }
        let over = self.tcap.context(session_id).map_or(true, |ctx| ctx.closed);
        if over && self.calls.remove(&session_id).is_some() {
            log::debug!("CAMEL call of session {} released", session_id);
        }
    }

    fn report(&self, info: &CamelSrtInfo) {
        if !self.options.display {
            return;
        }
        let operation = match info.operation {
            Some(operation) => operation,
            None => return,
        };
        for result in info.msginfo.iter().flatten() {
            match (result.is_duplicate, result.delta_time) {
                (true, _) => log::info!(
                    "Frame {}: {} duplicate {} (request in frame {:?})",
                    info.tcap.frame,
                    operation,
                    result.category,
                    result.request_frame
                ),
                (false, Some(delta)) => log::info!(
                    "Frame {}: {} {} time {:.9}s (request in frame {:?})",
                    info.tcap.frame,
                    operation,
                    result.category,
                    crate::srt::duration_secs(delta),
                    result.request_frame
                ),
                (false, None) => log::info!(
                    "Frame {}: {} {} request",
                    info.tcap.frame,
                    operation,
                    result.category
                ),
            }
        }
    }
}

impl DialogueCloseObserver for CamelTracker {
    fn dialogue_closed(
        &mut self,
        session_id: SessionId,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.close_call(session_id, frame, timestamp);
        let closed = self.tcap.dialogue_closed(session_id, frame, timestamp);
        self.release(session_id);
        closed
    }
}

/// Configurable options for a `CamelTracker`.
#[derive(Debug, Clone)]
pub(crate) struct CamelOptions {
    /// Whether CAMEL operations are matched at all.
    pub(crate) handle_srt: bool,
    /// Keep closed call records.
    pub(crate) persistent: bool,
    /// Log per-message annotations.
    pub(crate) display: bool,
}

impl From<&CamelConfig> for CamelOptions {
    fn from(config: &CamelConfig) -> Self {
        CamelOptions {
            handle_srt: config.handle_srt,
            persistent: config.persistent,
            display: config.display,
        }
    }
}
