use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::{CookieSource, VideoPipeline};
use crate::download::DownloaderConfig;
use crate::input::InputFormat;
use crate::lease::{AcquirePolicy, LeaseClient};
use crate::process::ProcessorConfig;
use crate::shutdown::DEFAULT_SHUTDOWN_COMMAND;

/// How long to keep asking the coordinator for a cookie.
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Seconds to wait between acquisition attempts
    #[arg(long, default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Give up after this many attempts (default: never)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Give up after this many seconds (default: never)
    #[arg(long)]
    pub acquire_deadline_secs: Option<u64>,
}

impl PollArgs {
    pub fn policy(&self) -> AcquirePolicy {
        AcquirePolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_attempts,
            deadline: self.acquire_deadline_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// CSV file with one (title, URL) pair per row
    #[arg(short, long, default_value = "topstep.csv")]
    pub input: PathBuf,

    /// Field delimiter of the input
    #[arg(long, default_value = ";", value_parser = parse_delimiter)]
    pub delimiter: u8,

    /// Input starts with a `Title`,`URL` header row
    #[arg(long)]
    pub has_headers: bool,

    /// Ledger of finished items
    #[arg(long, default_value = "finished.txt")]
    pub ledger: PathBuf,

    /// Directory that receives one folder per item
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory copied into every item folder
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Cookie file used when no coordinator is configured
    #[arg(long, default_value = "cookies.txt")]
    pub cookies: PathBuf,

    /// Directory holding the cookie files the coordinator hands out
    #[arg(long, default_value = ".")]
    pub cookies_dir: PathBuf,

    #[command(flatten)]
    pub poll: PollArgs,

    /// yt-dlp executable
    #[arg(long, default_value = "yt-dlp")]
    pub ytdlp: String,

    /// yt-dlp format selector
    #[arg(long, default_value = "bestvideo")]
    pub format: String,

    /// Interpreter for the per-item script
    #[arg(long, default_value = "python")]
    pub interpreter: String,

    /// Per-item script, relative to the item folder
    #[arg(long, default_value = "run.py")]
    pub script: String,

    /// Keep the video after successful processing
    #[arg(long)]
    pub keep_video: bool,

    /// Write a JSON report of every item here
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Power off the host when the batch is done
    #[arg(long)]
    pub shutdown: bool,

    /// Command used by --shutdown (must be the last option)
    #[arg(long, num_args = 1.., allow_hyphen_values = true, default_values = DEFAULT_SHUTDOWN_COMMAND)]
    pub shutdown_command: Vec<String>,
}

impl RunArgs {
    pub fn input_format(&self) -> InputFormat {
        InputFormat {
            delimiter: self.delimiter,
            has_headers: self.has_headers,
        }
    }

    pub fn pipeline(&self) -> VideoPipeline {
        VideoPipeline {
            downloader: DownloaderConfig {
                binary: self.ytdlp.clone(),
                format: self.format.clone(),
            },
            template: self.template.clone(),
            processor: ProcessorConfig {
                interpreter: self.interpreter.clone(),
                script: self.script.clone(),
                keep_video: self.keep_video,
            },
        }
    }

    /// Leased cookies when a coordinator client is available, otherwise the
    /// static cookie file.
    pub fn cookie_source(&self, client: Option<LeaseClient>) -> CookieSource {
        match client {
            Some(client) => CookieSource::Leased {
                client,
                policy: self.poll.policy(),
                cookies_dir: self.cookies_dir.clone(),
            },
            None => CookieSource::Static(self.cookies.clone()),
        }
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ if s == "\\t" => Ok(b'\t'),
        _ => Err(format!("delimiter must be a single ASCII character, got {:?}", s)),
    }
}
