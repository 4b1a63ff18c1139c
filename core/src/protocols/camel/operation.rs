//! CAMEL operations relevant to response time measurement.

use crate::srt::SrtCategory;

use serde::Serialize;
use strum_macros::{Display, EnumString};

/// Effect of an operation on the CAMEL call it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtAction {
    /// Starts the call record.
    OpenCall,
    /// Request side of a category pair.
    Request(SrtCategory),
    /// Request side of an ApplyCharging cycle, slot picked at runtime.
    AcrRequest,
    /// Response side of a category pair.
    Response(SrtCategory),
    /// Response side of an ApplyCharging cycle, slot picked at runtime.
    AcrResponse,
    /// Ends the call record and reports the session time.
    CloseCall,
    /// Terminates the underlying TCAP dialogue.
    CloseDialogue,
}

/// CAMEL operation, by local operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display)]
pub enum Operation {
    InitialDP,
    InitialDPSMS,
    InitialDPGPRS,
    EventReportGPRS,
    EventReportBCSM,
    ApplyChargingReport,
    ApplyCharging,
    Continue,
    ContinueSMS,
    ContinueGPRS,
    ReleaseCall,
    ReleaseGPRS,
    ReleaseSMS,
    EventReportSMS,
}

impl Operation {
    /// Returns the operation with local code `opcode`, if it takes part in matching.
    pub fn from_opcode(opcode: u8) -> Option<Operation> {
        let operation = match opcode {
            0 => Operation::InitialDP,
            22 => Operation::ReleaseCall,
            24 => Operation::EventReportBCSM,
            31 => Operation::Continue,
            35 => Operation::ApplyCharging,
            36 => Operation::ApplyChargingReport,
            60 => Operation::InitialDPSMS,
            64 => Operation::EventReportSMS,
            65 => Operation::ContinueSMS,
            66 => Operation::ReleaseSMS,
            75 => Operation::ContinueGPRS,
            78 => Operation::InitialDPGPRS,
            79 => Operation::ReleaseGPRS,
            80 => Operation::EventReportGPRS,
            _ => return None,
        };
        Some(operation)
    }

    /// Local operation code.
    pub fn opcode(self) -> u8 {
        match self {
            Operation::InitialDP => 0,
            Operation::ReleaseCall => 22,
            Operation::EventReportBCSM => 24,
            Operation::Continue => 31,
            Operation::ApplyCharging => 35,
            Operation::ApplyChargingReport => 36,
            Operation::InitialDPSMS => 60,
            Operation::EventReportSMS => 64,
            Operation::ContinueSMS => 65,
            Operation::ReleaseSMS => 66,
            Operation::ContinueGPRS => 75,
            Operation::InitialDPGPRS => 78,
            Operation::ReleaseGPRS => 79,
            Operation::EventReportGPRS => 80,
        }
    }

    /// Actions applied, in order, when the operation is seen.
    pub fn actions(self) -> &'static [SrtAction] {
        use SrtAction::*;
        match self {
            Operation::InitialDP => &[OpenCall, Request(SrtCategory::VoiceInitialDp)],
            Operation::InitialDPSMS => &[OpenCall, Request(SrtCategory::SmsInitialDp)],
            Operation::InitialDPGPRS => &[OpenCall, Request(SrtCategory::GprsInitialDp)],
            Operation::EventReportGPRS => &[OpenCall, Request(SrtCategory::GprsReport)],
            Operation::EventReportBCSM => &[Request(SrtCategory::VoiceDisconnect)],
            Operation::ApplyChargingReport => &[AcrRequest],
            Operation::ApplyCharging => &[AcrResponse],
            Operation::Continue => &[Response(SrtCategory::VoiceInitialDp)],
            Operation::ContinueSMS => &[Response(SrtCategory::SmsInitialDp)],
            Operation::ContinueGPRS => &[
                Response(SrtCategory::GprsInitialDp),
                Response(SrtCategory::GprsReport),
            ],
            Operation::ReleaseCall => &[Response(SrtCategory::VoiceDisconnect), CloseCall],
            Operation::ReleaseGPRS => &[CloseCall],
            Operation::ReleaseSMS | Operation::EventReportSMS => &[CloseCall, CloseDialogue],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_opcode_table() {
        for opcode in 0..=u8::MAX {
            if let Some(operation) = Operation::from_opcode(opcode) {
                assert_eq!(operation.opcode(), opcode);
                assert!(!operation.actions().is_empty());
            }
        }
        // RequestReportBCSMEvent
        assert_eq!(Operation::from_opcode(23), None);
        assert_eq!(Operation::from_opcode(35), Some(Operation::ApplyCharging));
        assert_eq!(Operation::InitialDPGPRS.to_string(), "InitialDPGPRS");
    }

    #[test]
    fn core_release_actions() {
        assert_eq!(
            Operation::ReleaseCall.actions(),
            &[
                SrtAction::Response(SrtCategory::VoiceDisconnect),
                SrtAction::CloseCall
            ]
        );
        assert!(Operation::ReleaseSMS
            .actions()
            .contains(&SrtAction::CloseDialogue));
        assert!(!Operation::ReleaseGPRS
            .actions()
            .contains(&SrtAction::CloseDialogue));
    }
}
