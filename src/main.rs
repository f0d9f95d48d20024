//! LRC Repair CLI
//!
//! File-backed driver for the repair engine. Shards live in one directory as
//! `shard{i}.dat`, each framed with its index byte.
//!
//! ```text
//! encode:  input file ──> shard0.dat .. shard{n-1}.dat + parity shards
//! rebuild: shard*.dat ──> RepairSession ──> rebuilt{lost}.dat
//! decode:  shard*.dat ──> DecodeSession ──> output file
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lrc_repair::lrc::encode::frame;
use lrc_repair::{
    CodeLayout, DecodeProgress, Error, LrcConfig, LrcEngine, RebuildProgress, Result, ShardIndex,
    Stage,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// LRC Repair - minimal-cost shard reconstruction for local reconstruction codes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "LRC_CONFIG")]
    config: Option<PathBuf>,

    /// Parity shards per code instance (overrides config)
    #[arg(long, env = "LRC_MAX_PARITY_SHARDS")]
    max_parity_shards: Option<usize>,

    /// Framed shard size in bytes, header included (overrides config)
    #[arg(long, env = "LRC_SHARD_SIZE")]
    shard_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a file into framed original shards and write their parity
    Encode {
        /// File to encode
        #[arg(long)]
        input: PathBuf,

        /// Directory receiving shard{i}.dat
        #[arg(long)]
        dir: PathBuf,

        /// Number of original shards (derived from the input size if omitted)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Rebuild one lost original shard from the shards present in a directory
    Rebuild {
        /// Directory holding shard{i}.dat
        #[arg(long)]
        dir: PathBuf,

        /// Number of original shards
        #[arg(long)]
        count: usize,

        /// Index of the original shard to rebuild
        #[arg(long)]
        lost: ShardIndex,

        /// Print a JSON report of the repair
        #[arg(long)]
        report: bool,
    },

    /// Reassemble the original data from the shards present in a directory
    Decode {
        /// Directory holding shard{i}.dat
        #[arg(long)]
        dir: PathBuf,

        /// Number of original shards
        #[arg(long)]
        count: usize,

        /// File receiving the decoded data
        #[arg(long)]
        output: PathBuf,

        /// Truncate the output to this many bytes
        #[arg(long)]
        length: Option<usize>,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting lrc-repair");

    if let Err(e) = run(args).await {
        error!(error = %e, code = e.status_code(), "Command failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let engine = LrcEngine::init(config)?;

    match args.command {
        Command::Encode { input, dir, count } => encode(&engine, &input, &dir, count).await,
        Command::Rebuild {
            dir,
            count,
            lost,
            report,
        } => rebuild(&engine, &dir, count, lost, report).await,
        Command::Decode {
            dir,
            count,
            output,
            length,
        } => decode(&engine, &dir, count, &output, length).await,
    }
}

fn load_config(args: &Args) -> Result<LrcConfig> {
    let mut config = match &args.config {
        Some(path) => LrcConfig::from_file(path)?,
        None => LrcConfig::default(),
    };
    if let Some(max_parity_shards) = args.max_parity_shards {
        config.max_parity_shards = max_parity_shards;
    }
    if let Some(shard_size) = args.shard_size {
        config.shard_size = shard_size;
    }
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Commands
// =============================================================================

fn shard_path(dir: &Path, index: ShardIndex) -> PathBuf {
    dir.join(format!("shard{}.dat", index))
}

async fn encode(
    engine: &LrcEngine,
    input: &Path,
    dir: &Path,
    count: Option<usize>,
) -> Result<()> {
    let shard_size = engine.config().shard_size;
    let block_size = shard_size - 1;
    let data = tokio::fs::read(input).await?;

    let count = count.unwrap_or_else(|| data.len().div_ceil(block_size).max(1));
    if data.len() > count * block_size {
        return Err(Error::InvalidArgument(format!(
            "{} bytes do not fit {} shards of {} bytes",
            data.len(),
            count,
            block_size
        )));
    }

    let mut originals = Vec::with_capacity(count * shard_size);
    for index in 0..count {
        let start = (index * block_size).min(data.len());
        let end = ((index + 1) * block_size).min(data.len());
        let mut block = data[start..end].to_vec();
        block.resize(block_size, 0);
        originals.extend(frame(index, &block)?);
    }

    let parity = engine.encode(count, shard_size, &originals)?;

    tokio::fs::create_dir_all(dir).await?;
    for (index, framed) in originals.chunks_exact(shard_size).enumerate() {
        tokio::fs::write(shard_path(dir, index), framed).await?;
    }
    for (index, framed) in parity.iter() {
        tokio::fs::write(shard_path(dir, index), framed).await?;
    }

    info!(
        originals = count,
        parities = parity.len(),
        bytes = data.len(),
        dir = %dir.display(),
        "Encoded shard set"
    );
    Ok(())
}

/// Summary of one rebuild run
#[derive(Debug, Serialize)]
struct RebuildReport {
    lost_index: ShardIndex,
    stage: Stage,
    fetched: Vec<ShardIndex>,
    declared_lost: Vec<ShardIndex>,
    bytes_fetched: usize,
    output: PathBuf,
}

async fn rebuild(
    engine: &LrcEngine,
    dir: &Path,
    count: usize,
    lost: ShardIndex,
    report: bool,
) -> Result<()> {
    let shard_size = engine.config().shard_size;
    let block_size = shard_size - 1;
    let handle = engine.begin_rebuild(count, lost, block_size)?;

    let result = async {
        let (fetched, declared_lost) = drive_rebuild(engine, handle, dir, block_size).await?;
        let stage = engine.stage(handle)?;
        let block = engine.get_result(handle)?;
        let output = dir.join(format!("rebuilt{}.dat", lost));
        tokio::fs::write(&output, frame(lost, &block)?).await?;

        info!(lost_index = lost, stage = %stage, fetched = fetched.len(), "Shard rebuilt");
        if report {
            let report = RebuildReport {
                lost_index: lost,
                stage,
                bytes_fetched: fetched.len() * shard_size,
                fetched,
                declared_lost,
                output,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok::<(), Error>(())
    }
    .await;

    engine.free_handle(handle)?;
    result
}

async fn drive_rebuild(
    engine: &LrcEngine,
    handle: lrc_repair::SessionHandle,
    dir: &Path,
    block_size: usize,
) -> Result<(Vec<ShardIndex>, Vec<ShardIndex>)> {
    let mut fetched = Vec::new();
    let mut declared_lost = Vec::new();

    loop {
        let list = engine.next_request_list(handle)?;
        let Some(&index) = list.first() else {
            return Ok((fetched, declared_lost));
        };

        match read_block(dir, index, block_size).await? {
            Some(block) => {
                fetched.push(index);
                if engine.add_shard(handle, index, &block)? == RebuildProgress::Complete {
                    return Ok((fetched, declared_lost));
                }
            }
            None => {
                engine.declare_lost(handle, index)?;
                declared_lost.push(index);
            }
        }
    }
}

/// Read a shard file and strip its frame; absent or malformed files count as lost.
async fn read_block(dir: &Path, index: ShardIndex, block_size: usize) -> Result<Option<Vec<u8>>> {
    let path = shard_path(dir, index);
    let framed = match tokio::fs::read(&path).await {
        Ok(framed) => framed,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if framed.len() != block_size + 1 || framed[0] as usize != index {
        warn!(path = %path.display(), len = framed.len(), "Ignoring malformed shard file");
        return Ok(None);
    }
    Ok(Some(framed[1..].to_vec()))
}

async fn decode(
    engine: &LrcEngine,
    dir: &Path,
    count: usize,
    output: &Path,
    length: Option<usize>,
) -> Result<()> {
    let shard_size = engine.config().shard_size;
    let layout = CodeLayout::new(count, engine.config().global_count())?;
    let handle = engine.begin_decode(count, shard_size)?;

    for index in 0..layout.total_shards() {
        let framed = match tokio::fs::read(shard_path(dir, index)).await {
            Ok(framed) => framed,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        if let DecodeProgress::Complete(mut data) = engine.decode(handle, &framed)? {
            if let Some(length) = length {
                data.truncate(length);
            }
            tokio::fs::write(output, &data).await?;
            info!(bytes = data.len(), output = %output.display(), "Decoded shard set");
            return Ok(());
        }
    }

    // Shards ran out before the originals were determined
    engine.free_handle(handle)?;
    Err(Error::NotReady)
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
