#![allow(clippy::needless_doctest_main)]
// #![warn(missing_docs)]

//! A transaction correlation and service response time engine for TCAP and CAMEL signaling.
//!
//! The engine consumes the decoded facts of TCAP messages (role, transaction ids, signaling
//! addresses, frame number and capture time) and matches them into dialogues, even when
//! transaction ids are reused, messages are retransmitted or lost, or a dialogue is observed from
//! both signaling directions. On top of dialogues, CAMEL operations are paired into categories and
//! the delay of every pair is measured:
//!
//! - Whole dialogues (BEGIN to END/ABORT, or ANSI QUERY to RESPONSE)
//! - Voice InitialDP, up to three interleaved ApplyCharging cycles, and disconnects
//! - GPRS InitialDP and event reports
//! - SMS InitialDP
//!
//! Message decoding is out of scope. Decoders (or a replay file) provide [TcapMessage]s, and every
//! message yields value-typed result records that callers may keep.
//!
//! The following example replays a file of decoded messages and prints every matched response time:
//!
//! ```rust
//! /*
//! use tcapsrt_core::config::load_config;
//! use tcapsrt_core::Runtime;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config("./configs/replay.toml")?;
//!     let mut runtime = Runtime::new(config, |info| {
//!         for srt in info.matched() {
//!             println!("{}: {:?}", srt.category, srt.delta_time);
//!         }
//!     })?;
//!     let summary = runtime.run()?;
//!     summary.stats.display();
//!     Ok(())
//! }
//!  */
//! ```

pub mod config;
pub mod protocols;
mod runtime;
pub mod srt;
pub mod stats;
pub mod tcaptrack;

pub use self::protocols::camel::{CamelSrtInfo, CamelTracker};
pub use self::runtime::{read_facts, FactRecord, ReplayError, ReplaySummary, Runtime};
pub use self::srt::{SrtCategory, SrtResult};
pub use self::tcaptrack::{
    DialogueCloseObserver, Role, SessionId, SignalingAddr, TcapMessage, TcapSrtInfo, TcapTracker,
};
