//! Offline replay runtime.
//!
//! The runtime reads decoded message facts from a file, feeds them through the correlation engine
//! in file order, and hands every result to a user-defined callback.

mod offline;
use self::offline::*;

pub use self::offline::{read_facts, FactRecord, ReplayError, ReplaySummary};

use crate::config::*;
use crate::protocols::camel::CamelSrtInfo;

use anyhow::{bail, Result};

/// The replay runtime.
pub struct Runtime<'a> {
    offline: OfflineRuntime<'a>,
}

impl<'a> Runtime<'a> {
    /// Creates a new runtime from the `config` settings and callback.
    ///
    /// `config` must carry a `[replay]` table. `cb` is invoked with the result of every message
    /// processed, on every pass.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut runtime = Runtime::new(config, |info| println!("{:?}", info))?;
    /// ```
    pub fn new(config: SrtConfig, cb: impl FnMut(&CamelSrtInfo) + 'a) -> Result<Self> {
        config.validate()?;
        let replay = match &config.replay {
            Some(replay) => replay.clone(),
            None => bail!("Replay requires a [replay] table in the configuration"),
        };
        log::info!("Initializing Offline Analysis...");
        let options = OfflineOptions { replay, config };
        Ok(Runtime {
            offline: OfflineRuntime::new(options, Box::new(cb)),
        })
    }

    /// Replays the input for the configured number of passes.
    pub fn run(&mut self) -> Result<ReplaySummary> {
        let summary = self.offline.run()?;
        log::info!("Done.");
        Ok(summary)
    }
}
