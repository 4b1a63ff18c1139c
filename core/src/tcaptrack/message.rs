use super::dialogue_id::SignalingAddr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Role of a TCAP message in its dialogue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// ITU TC-BEGIN.
    Begin,
    /// ITU TC-CONTINUE.
    Continue,
    /// ITU TC-END.
    End,
    /// ITU TC-ABORT (user or provider).
    Abort,
    /// ANSI QUERY (with or without permission).
    AnsiQuery,
    /// ANSI CONVERSATION (with or without permission).
    AnsiConversation,
    /// ANSI RESPONSE.
    AnsiResponse,
    /// ANSI ABORT.
    AnsiAbort,
}

impl Role {
    /// Returns `true` for ANSI TCAP packages.
    #[inline]
    pub fn is_ansi(self) -> bool {
        matches!(
            self,
            Role::AnsiQuery | Role::AnsiConversation | Role::AnsiResponse | Role::AnsiAbort
        )
    }

    /// Returns `true` for messages that terminate their dialogue.
    #[inline]
    pub fn terminates(self) -> bool {
        matches!(
            self,
            Role::End | Role::Abort | Role::AnsiResponse | Role::AnsiAbort
        )
    }
}

/// Decoded facts of one TCAP message, as handed over by the protocol decoder.
///
/// `src_tid` is the originating transaction id (BEGIN, CONTINUE) or the ANSI transaction id.
/// `dst_tid` is the destination transaction id (CONTINUE, END, ABORT) and is ignored otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcapMessage {
    /// Dialogue role.
    pub role: Role,
    /// Originating transaction id.
    pub src_tid: u32,
    /// Destination transaction id.
    pub dst_tid: u32,
    /// Sending endpoint.
    pub src: SignalingAddr,
    /// Receiving endpoint.
    pub dst: SignalingAddr,
    /// Capture frame number.
    pub frame: u32,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Operation code of the CAMEL component carried, if any.
    pub opcode: Option<u8>,
    /// Application context name from the dialogue portion, if present.
    pub application_context: Option<String>,
}

impl TcapMessage {
    pub fn new(
        role: Role,
        src_tid: u32,
        dst_tid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        TcapMessage {
            role,
            src_tid,
            dst_tid,
            src,
            dst,
            frame,
            timestamp,
            opcode: None,
            application_context: None,
        }
    }

    /// TC-BEGIN with originating transaction id `otid`.
    pub fn begin(
        otid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(Role::Begin, otid, 0, src, dst, frame, timestamp)
    }

    /// TC-CONTINUE with originating `otid` and destination `dtid`.
    pub fn cont(
        otid: u32,
        dtid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(Role::Continue, otid, dtid, src, dst, frame, timestamp)
    }

    /// TC-END addressed to `dtid`.
    pub fn end(
        dtid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(Role::End, 0, dtid, src, dst, frame, timestamp)
    }

    /// TC-ABORT addressed to `dtid`.
    pub fn abort(
        dtid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(Role::Abort, 0, dtid, src, dst, frame, timestamp)
    }

    /// ANSI package `role` for transaction `tid`.
    pub fn ansi(
        role: Role,
        tid: u32,
        src: SignalingAddr,
        dst: SignalingAddr,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        debug_assert!(role.is_ansi(), "{} is not an ANSI package", role);
        Self::new(role, tid, 0, src, dst, frame, timestamp)
    }

    /// Attaches the operation code of the carried CAMEL component.
    pub fn with_opcode(mut self, opcode: u8) -> Self {
        self.opcode = Some(opcode);
        self
    }

    /// Attaches the application context name of the dialogue portion.
    pub fn with_application_context(mut self, oid: impl Into<String>) -> Self {
        self.application_context = Some(oid.into());
        self
    }
}

/// Converts a capture timestamp given as seconds and nanoseconds since the epoch.
pub fn capture_time(secs: i64, nsecs: u32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, nsecs).single()
}
