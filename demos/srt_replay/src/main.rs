use tcapsrt_core::config::{load_config, ReplayConfig};
use tcapsrt_core::{CamelSrtInfo, Runtime};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

// Define command-line arguments.
#[derive(Parser, Debug)]
struct Args {
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    config: PathBuf,
    /// Replay input, overrides the `[replay]` table of the configuration.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    input: Option<PathBuf>,
    #[clap(
        short,
        long,
        parse(from_os_str),
        value_name = "FILE",
        default_value = "srt.jsonl"
    )]
    outfile: PathBuf,
    /// Also write the statistics table as CSV.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    stats: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(input) = &args.input {
        let passes = config.replay.as_ref().map_or(1, |r| r.passes);
        config.replay = Some(ReplayConfig {
            input: input.to_string_lossy().into_owned(),
            passes,
        });
    }

    // Use `BufWriter` to improve the speed of repeated write calls to the same file.
    let mut wtr = BufWriter::new(File::create(&args.outfile)?);
    let mut cnt = 0;
    let mut failed = 0;

    let callback = |info: &CamelSrtInfo| {
        let logged = serde_json::to_string(info)
            .map_err(anyhow::Error::from)
            .and_then(|serialized| {
                wtr.write_all(serialized.as_bytes())?;
                wtr.write_all(b"\n")?;
                Ok(())
            });
        match logged {
            Ok(()) => cnt += 1,
            Err(err) => {
                log::error!("Frame {}: {:#}", info.tcap.frame, err);
                failed += 1;
            }
        }
    };
    let mut runtime = Runtime::new(config, callback)?;
    let summary = runtime.run()?;
    drop(runtime);

    wtr.flush()?;
    summary.stats.display();
    if let Some(path) = &args.stats {
        summary.stats.dump_csv(path)?;
    }
    println!(
        "Done. Logged {} results ({} failed) to {:?}, {} dialogues tracked",
        cnt, failed, &args.outfile, summary.nb_dialogues
    );
    Ok(())
}
