use anyhow::Result;
use clap::Parser;
use scour_wipe::config::DEFAULT_BLOCK_SIZE;
use scour_wipe::{BadBlockTracker, RunSummary, Target, WipeConfig, WipeError, WipeMode, WipeRun};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scour")]
#[command(version)]
#[command(about = "Wipe a drive or file by overwriting it with a fill byte, then verify the result")]
#[command(after_help = "Bad blocks are listed as OFFSET/KIND:\n    \
    r: error occurred while reading\n    \
    w: error occurred while writing\n    \
    u: block is not wiped (unwiped)\n\n\
    The run exits 0 when it completes, even with bad blocks under the -m \
    limit,\nand 1 on any fatal condition.")]
struct Cli {
    /// Physical drive or file to wipe
    target: PathBuf,

    /// Overwrite all bytes, do not check whether they are already wiped
    #[arg(short = 'a', conflicts_with_all = ["two_pass", "verify_only"])]
    all: bool,

    /// Two-pass wipe: the first pass writes random bytes
    #[arg(short = 'x', conflicts_with = "verify_only")]
    two_pass: bool,

    /// Verify against the fill byte, do not wipe
    #[arg(short = 'v')]
    verify_only: bool,

    /// Block size in bytes for reads and writes (a multiple of 512, between 512 and 32768)
    #[arg(short = 'b', value_name = "BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Byte to write and/or verify, as a hex value between 00 and ff
    #[arg(short = 'f', value_name = "VALUE", default_value = "00", value_parser = parse_fill_byte)]
    fill: u8,

    /// Abort after this many bad blocks
    #[arg(short = 'm', value_name = "MAX_BAD_BLOCKS", default_value_t = 200)]
    max_bad_blocks: u32,

    /// Maximum retries after a read or write error
    #[arg(short = 'r', value_name = "MAX_RETRIES", default_value_t = 200)]
    max_retries: u32,
}

impl Cli {
    fn mode(&self) -> WipeMode {
        if self.all {
            WipeMode::ForceAll
        } else if self.two_pass {
            WipeMode::TwoPass
        } else if self.verify_only {
            WipeMode::VerifyOnly
        } else {
            WipeMode::Selective
        }
    }
}

fn parse_fill_byte(arg: &str) -> Result<u8, String> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u8::from_str_radix(digits, 16)
        .map_err(|_| format!("must be a hex byte between 00 and ff, got '{arg}'"))
}

fn main() -> ExitCode {
    // clap's default exit code for argument errors is 2; this tool promises
    // 0 for a completed run or help, 1 for everything fatal
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let is_error = err.use_stderr();
            let _ = err.print();
            return if is_error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(_summary) => ExitCode::SUCCESS,
        Err(err) => {
            // The threshold abort still owes the user the offset listing
            if let Some(WipeError::TooManyBadBlocks { report, .. }) =
                err.downcast_ref::<WipeError>()
            {
                println!("\n\n{}", report.render());
            }
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let mode = cli.mode();
    let config = WipeConfig::new(cli.block_size, cli.fill)?;
    let mut target = Target::open(&cli.target, mode.is_destructive())?;

    info!(
        target = %cli.target.display(),
        ?mode,
        block_size = cli.block_size,
        fill = %format_args!("{:#04x}", cli.fill),
        max_bad_blocks = cli.max_bad_blocks,
        max_retries = cli.max_retries,
        size = target.size(),
        physical = target.is_physical(),
        "starting run"
    );

    // A destructive run against a physical drive first invalidates the
    // partition layout so nothing keeps using stale partitions mid-wipe
    if mode.is_destructive() && target.is_physical() {
        target.clear_layout()?;
    }

    let tracker = BadBlockTracker::new(cli.max_bad_blocks, cli.max_retries);
    let summary = WipeRun::new(target, config, tracker, mode).execute()?;
    Ok(summary)
}
