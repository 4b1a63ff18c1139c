//! CAMEL call records.
//!
//! A call record exists per TCAP dialogue carrying CAMEL operations. It holds one slot per
//! [SrtCategory](crate::srt::SrtCategory) pairing a request with its response.

use crate::srt::{SrtCategory, SrtResult};
use crate::tcaptrack::SessionId;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Request/response state of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategorySlot {
    /// Frame of the recorded request.
    pub req_frame: Option<u32>,
    /// Frame of the recorded response.
    pub rsp_frame: Option<u32>,
    /// Capture time of the recorded request.
    pub req_time: Option<DateTime<Utc>>,
    /// `true` once the response is recorded.
    pub responded: bool,
}

/// CAMEL state of one dialogue.
#[derive(Debug, Clone, Serialize)]
pub struct CamelCall {
    /// Session id of the TCAP dialogue.
    pub session_id: SessionId,
    /// Frame that opened the dialogue.
    pub begin_frame: u32,
    /// Capture time of the dialogue opening.
    pub begin_time: DateTime<Utc>,
    /// Frame that closed the call, if closed.
    pub end_frame: Option<u32>,
    /// Capture time of the closing frame, if closed.
    pub end_time: Option<DateTime<Utc>>,
    slots: [CategorySlot; SrtCategory::COUNT],
}

impl CamelCall {
    pub(crate) fn new(session_id: SessionId, begin_frame: u32, begin_time: DateTime<Utc>) -> Self {
        CamelCall {
            session_id,
            begin_frame,
            begin_time,
            end_frame: None,
            end_time: None,
            slots: [CategorySlot::default(); SrtCategory::COUNT],
        }
    }

    /// Returns `true` once the call is closed.
    #[inline]
    pub fn closed(&self) -> bool {
        self.end_frame.is_some()
    }

    /// Returns the slot of `category`.
    pub fn slot(&self, category: SrtCategory) -> &CategorySlot {
        &self.slots[category.index()]
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut CategorySlot> {
        debug_assert!(index < SrtCategory::COUNT, "category slot {} out of range", index);
        self.slots.get_mut(index)
    }

    /// Records a request of `category` seen at `frame`.
    ///
    /// A request repeated at another frame is flagged duplicate and leaves the slot untouched,
    /// except for the disconnect category where a later request replaces the stored one.
    pub(crate) fn on_request(
        &mut self,
        category: SrtCategory,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> SrtResult {
        let mut result = SrtResult::new(Some(self.session_id), category);
        let slot = match self.slot_mut(category.index()) {
            Some(slot) => slot,
            None => return result,
        };
        match slot.req_frame {
            None => {
                slot.req_frame = Some(frame);
                slot.req_time = Some(timestamp);
            }
            Some(req) if req == frame => (),
            Some(req) if category == SrtCategory::VoiceDisconnect && frame > req => {
                slot.req_frame = Some(frame);
                slot.req_time = Some(timestamp);
            }
            Some(req) => {
                log::debug!("Frame {}: duplicate {} request of frame {}", frame, category, req);
                result.is_duplicate = true;
            }
        }
        result.request_frame = slot.req_frame;
        result.response_frame = slot.rsp_frame;
        result
    }

    /// Records a response of `category` seen at `frame` and computes its response time.
    ///
    /// Responses without an earlier request are dropped and produce no delay.
    pub(crate) fn on_response(
        &mut self,
        category: SrtCategory,
        frame: u32,
        timestamp: DateTime<Utc>,
    ) -> SrtResult {
        let mut result = SrtResult::new(Some(self.session_id), category);
        let slot = match self.slot_mut(category.index()) {
            Some(slot) => slot,
            None => return result,
        };
        let (req, req_time) = match (slot.req_frame, slot.req_time) {
            (Some(req), Some(req_time)) if req < frame => (req, req_time),
            _ => {
                log::debug!("Frame {}: {} response without request", frame, category);
                return result;
            }
        };
        result.request_frame = Some(req);
        match slot.rsp_frame {
            Some(rsp) if rsp != frame => {
                log::debug!("Frame {}: duplicate {} response of frame {}", frame, category, rsp);
                result.is_duplicate = true;
                result.response_frame = Some(rsp);
            }
            _ => {
                slot.rsp_frame = Some(frame);
                slot.responded = true;
                result.request_available = true;
                result.response_frame = Some(frame);
                result.delta_time = Some(timestamp - req_time);
            }
        }
        result
    }

    /// Picks the ApplyCharging slot for a report seen at `frame`.
    ///
    /// A slot already holding this frame wins, then the first empty slot, then the first slot whose
    /// cycle completed before `frame`. That slot is cleared so a new cycle starts in it. If every
    /// slot is busy the first one is used.
    pub(crate) fn acr_request_slot(&mut self, frame: u32) -> SrtCategory {
        let acr = SrtCategory::ACR_SLOTS;
        if let Some(category) = acr
            .iter()
            .find(|c| self.slot(**c).req_frame == Some(frame))
        {
            return *category;
        }
        if let Some(category) = acr.iter().find(|c| self.slot(**c).req_frame.is_none()) {
            return *category;
        }
        let completed = acr
            .iter()
            .find(|c| self.slot(**c).rsp_frame.map_or(false, |rsp| rsp < frame))
            .copied();
        if let Some(category) = completed {
            if let Some(slot) = self.slot_mut(category.index()) {
                *slot = CategorySlot::default();
            }
            return category;
        }
        SrtCategory::VoiceAcr1
    }

    /// Picks the ApplyCharging slot for a response seen at `frame`.
    ///
    /// A slot already answered by this frame wins, then the latest outstanding request, then the
    /// latest request before `frame`. Defaults to the first slot.
    pub(crate) fn acr_response_slot(&self, frame: u32) -> SrtCategory {
        let acr = SrtCategory::ACR_SLOTS;
        if let Some(category) = acr
            .iter()
            .find(|c| self.slot(**c).rsp_frame == Some(frame))
        {
            return *category;
        }
        let latest = |outstanding: bool| {
            acr.iter()
                .filter_map(|c| {
                    let slot = self.slot(*c);
                    match slot.req_frame {
                        Some(req) if req < frame && (!outstanding || slot.rsp_frame.is_none()) => {
                            Some((req, *c))
                        }
                        _ => None,
                    }
                })
                .max_by_key(|(req, _)| *req)
                .map(|(_, c)| c)
        };
        latest(true)
            .or_else(|| latest(false))
            .unwrap_or(SrtCategory::VoiceAcr1)
    }

    /// Marks the call closed at `frame` and reports the session time.
    ///
    /// Returns `None` if the call was already closed by another frame.
    pub(crate) fn close(&mut self, frame: u32, timestamp: DateTime<Utc>) -> Option<SrtResult> {
        match self.end_frame {
            Some(end) if end != frame => return None,
            Some(_) => (),
            None => {
                self.end_frame = Some(frame);
                self.end_time = Some(timestamp);
            }
        }
        let mut result = SrtResult::new(Some(self.session_id), SrtCategory::Session);
        result.request_available = true;
        result.request_frame = Some(self.begin_frame);
        result.response_frame = self.end_frame;
        result.delta_time = Some(timestamp - self.begin_time);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn call() -> CamelCall {
        CamelCall::new(1, 1, at(0))
    }

    fn acr_cycle(call: &mut CamelCall, req: u32, rsp: u32) -> (SrtCategory, SrtResult) {
        let category = call.acr_request_slot(req);
        call.on_request(category, req, at(req as i64 * 10));
        let rsp_category = call.acr_response_slot(rsp);
        assert_eq!(category, rsp_category);
        (category, call.on_response(rsp_category, rsp, at(rsp as i64 * 10)))
    }

    #[test]
    fn core_request_response_pair() {
        let mut call = call();
        let req = call.on_request(SrtCategory::VoiceInitialDp, 1, at(0));
        assert!(!req.is_duplicate);
        assert_eq!(req.request_frame, Some(1));
        let rsp = call.on_response(SrtCategory::VoiceInitialDp, 2, at(120));
        assert!(rsp.request_available);
        assert_eq!(rsp.delta_time, Some(Duration::milliseconds(120)));
        assert!(call.slot(SrtCategory::VoiceInitialDp).responded);
    }

    #[test]
    fn core_duplicate_request_kept() {
        let mut call = call();
        call.on_request(SrtCategory::VoiceInitialDp, 1, at(0));
        let dup = call.on_request(SrtCategory::VoiceInitialDp, 3, at(50));
        assert!(dup.is_duplicate);
        let slot = call.slot(SrtCategory::VoiceInitialDp);
        assert_eq!(slot.req_frame, Some(1));
        assert_eq!(slot.req_time, Some(at(0)));
        // re-dissection of the original frame
        assert!(!call.on_request(SrtCategory::VoiceInitialDp, 1, at(0)).is_duplicate);
    }

    #[test]
    fn core_disconnect_replaced() {
        let mut call = call();
        call.on_request(SrtCategory::VoiceDisconnect, 5, at(50));
        let later = call.on_request(SrtCategory::VoiceDisconnect, 7, at(70));
        assert!(!later.is_duplicate);
        assert_eq!(later.request_frame, Some(7));
        let rsp = call.on_response(SrtCategory::VoiceDisconnect, 8, at(100));
        assert_eq!(rsp.delta_time, Some(Duration::milliseconds(30)));
        // an earlier frame does not replace
        assert!(call.on_request(SrtCategory::VoiceDisconnect, 6, at(60)).is_duplicate);
    }

    #[test]
    fn core_duplicate_response() {
        let mut call = call();
        call.on_request(SrtCategory::SmsInitialDp, 1, at(0));
        call.on_response(SrtCategory::SmsInitialDp, 2, at(20));
        let dup = call.on_response(SrtCategory::SmsInitialDp, 3, at(30));
        assert!(dup.is_duplicate);
        assert_eq!(dup.delta_time, None);
        assert_eq!(dup.response_frame, Some(2));
        // re-dissection of the answering frame reports the same delay
        let again = call.on_response(SrtCategory::SmsInitialDp, 2, at(20));
        assert!(!again.is_duplicate);
        assert_eq!(again.delta_time, Some(Duration::milliseconds(20)));
    }

    #[test]
    fn core_out_of_order_response_dropped() {
        let mut call = call();
        let orphan = call.on_response(SrtCategory::GprsReport, 4, at(40));
        assert!(!orphan.request_available);
        assert_eq!(orphan.delta_time, None);
        assert!(!call.slot(SrtCategory::GprsReport).responded);

        call.on_request(SrtCategory::GprsInitialDp, 9, at(90));
        let early = call.on_response(SrtCategory::GprsInitialDp, 8, at(80));
        assert_eq!(early.delta_time, None);
        assert_eq!(call.slot(SrtCategory::GprsInitialDp).rsp_frame, None);
    }

    #[test]
    fn core_acr_rotation() {
        let mut call = call();
        let (c1, r1) = acr_cycle(&mut call, 10, 11);
        let (c2, _) = acr_cycle(&mut call, 20, 21);
        let (c3, _) = acr_cycle(&mut call, 30, 31);
        assert_eq!(
            [c1, c2, c3],
            [SrtCategory::VoiceAcr1, SrtCategory::VoiceAcr2, SrtCategory::VoiceAcr3]
        );
        assert_eq!(r1.delta_time, Some(Duration::milliseconds(10)));
        // fourth cycle reuses the first slot
        let (c4, r4) = acr_cycle(&mut call, 40, 41);
        assert_eq!(c4, SrtCategory::VoiceAcr1);
        assert!(!r4.is_duplicate);
        assert_eq!(r4.delta_time, Some(Duration::milliseconds(10)));
        assert_eq!(call.slot(SrtCategory::VoiceAcr1).req_frame, Some(40));
    }

    #[test]
    fn core_acr_interleaved() {
        let mut call = call();
        let first = call.acr_request_slot(10);
        call.on_request(first, 10, at(100));
        let second = call.acr_request_slot(12);
        call.on_request(second, 12, at(120));
        assert_eq!(first, SrtCategory::VoiceAcr1);
        assert_eq!(second, SrtCategory::VoiceAcr2);
        // the latest outstanding report is answered first
        assert_eq!(call.acr_response_slot(13), SrtCategory::VoiceAcr2);
        call.on_response(SrtCategory::VoiceAcr2, 13, at(130));
        assert_eq!(call.acr_response_slot(14), SrtCategory::VoiceAcr1);
        // re-dissection finds the answered slot again
        assert_eq!(call.acr_response_slot(13), SrtCategory::VoiceAcr2);
        assert_eq!(call.acr_request_slot(12), SrtCategory::VoiceAcr2);
    }

    #[test]
    fn core_acr_all_busy() {
        let mut call = call();
        for frame in [10, 11, 12] {
            let category = call.acr_request_slot(frame);
            call.on_request(category, frame, at(frame as i64));
        }
        assert_eq!(call.acr_request_slot(13), SrtCategory::VoiceAcr1);
        assert!(call.on_request(SrtCategory::VoiceAcr1, 13, at(13)).is_duplicate);
    }

    #[test]
    fn core_close_once() {
        let mut call = call();
        let session = call.close(9, at(900)).unwrap();
        assert_eq!(session.category, SrtCategory::Session);
        assert_eq!(session.delta_time, Some(Duration::milliseconds(900)));
        assert!(call.closed());
        assert!(call.close(9, at(900)).is_some());
        assert!(call.close(10, at(1000)).is_none());
    }
}
