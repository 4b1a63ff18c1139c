//! Service response time records.
//!
//! Every correlated message yields value-typed result records. TCAP dialogues report on the
//! [Session](SrtCategory::Session) category; the CAMEL matcher reports on the operation pair
//! categories.

use crate::tcaptrack::SessionId;

use chrono::Duration;
use serde::{Serialize, Serializer};
use strum_macros::{Display, EnumIter, EnumString};

/// Request/response pairing category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, EnumIter, EnumString, Display,
)]
pub enum SrtCategory {
    /// Whole dialogue, from opening to closing message.
    #[strum(serialize = "Session")]
    Session,
    /// InitialDP / Continue.
    #[strum(serialize = "VoiceInitialDP")]
    VoiceInitialDp,
    /// ApplyChargingReport / ApplyCharging, first slice.
    #[strum(serialize = "VoiceACR1")]
    VoiceAcr1,
    /// ApplyChargingReport / ApplyCharging, second slice.
    #[strum(serialize = "VoiceACR2")]
    VoiceAcr2,
    /// ApplyChargingReport / ApplyCharging, third slice.
    #[strum(serialize = "VoiceACR3")]
    VoiceAcr3,
    /// EventReportBCSM / ReleaseCall.
    #[strum(serialize = "VoiceDisconnect")]
    VoiceDisconnect,
    /// InitialDPGPRS / ContinueGPRS.
    #[strum(serialize = "GprsInitialDP")]
    GprsInitialDp,
    /// EventReportGPRS / ContinueGPRS.
    #[strum(serialize = "GprsReport")]
    GprsReport,
    /// InitialDPSMS / ContinueSMS.
    #[strum(serialize = "SmsInitialDP")]
    SmsInitialDp,
}

impl SrtCategory {
    /// Number of categories.
    pub const COUNT: usize = 9;

    /// The interleavable ApplyCharging slices, in scan order.
    pub const ACR_SLOTS: [SrtCategory; 3] = [
        SrtCategory::VoiceAcr1,
        SrtCategory::VoiceAcr2,
        SrtCategory::VoiceAcr3,
    ];

    /// Slot index of the category.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the ApplyCharging family.
    #[inline]
    pub fn is_acr(self) -> bool {
        matches!(
            self,
            SrtCategory::VoiceAcr1 | SrtCategory::VoiceAcr2 | SrtCategory::VoiceAcr3
        )
    }
}

/// Result of correlating one message within one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SrtResult {
    /// Correlation handle of the dialogue, `None` for orphan messages.
    pub session_id: Option<SessionId>,
    /// Category the result applies to.
    pub category: SrtCategory,
    /// `true` if the message repeats an already recorded request or response.
    pub is_duplicate: bool,
    /// Service response time, present when this message completes a pair.
    #[serde(serialize_with = "serialize_delta")]
    pub delta_time: Option<Duration>,
    /// `true` if the opening request of the pair is known.
    pub request_available: bool,
    /// Frame of the request (or dialogue opening) this message relates to.
    pub request_frame: Option<u32>,
    /// Frame of the response already recorded for the pair.
    pub response_frame: Option<u32>,
}

impl SrtResult {
    /// An empty result for `category`.
    pub fn new(session_id: Option<SessionId>, category: SrtCategory) -> Self {
        SrtResult {
            session_id,
            category,
            is_duplicate: false,
            delta_time: None,
            request_available: false,
            request_frame: None,
            response_frame: None,
        }
    }

    /// A result for a message no dialogue could be resolved for.
    pub fn unmatched(category: SrtCategory) -> Self {
        Self::new(None, category)
    }

    /// Returns `true` if no dialogue was resolved.
    #[inline]
    pub fn is_unmatched(&self) -> bool {
        self.session_id.is_none()
    }
}

/// Serializes a delta as fractional seconds.
fn serialize_delta<S>(delta: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match delta {
        Some(delta) => serializer.serialize_some(&duration_secs(*delta)),
        None => serializer.serialize_none(),
    }
}

/// Returns `delta` in seconds, with nanosecond precision when representable.
pub fn duration_secs(delta: Duration) -> f64 {
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
