pub mod defaults;

use crate::error::HarnessError;
use crate::params::TrialParameters;
use clap::Parser;
use defaults::*;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Verbose output, connection level diagnostics are logged at debug level
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// Don't print the response bodies, only their sizes
    #[arg(long, short = 'q', default_value_t = false)]
    pub quiet: bool,

    /// Key log file, appended to by every trial in the NSS key log format
    #[arg(long = "keylog")]
    pub key_log_path: Option<PathBuf>,

    /// Skip certificate verification
    #[arg(long, default_value_t = false)]
    pub insecure: bool,

    /// Write a qlog file per connection
    #[arg(long, default_value_t = false)]
    pub qlog: bool,

    /// Directory the qlog files are written to
    #[arg(long, default_value = DEFAULT_TRACE_DIR)]
    pub qlog_dir: PathBuf,

    /// Only send the first Initial packet of every handshake
    #[arg(long, alias = "onlySendInitial", default_value_t = false)]
    pub only_send_initial: bool,

    /// Send the first Initial packet again once the handshake has completed
    #[arg(long, alias = "sendInitialAfterHandshake", default_value_t = false)]
    pub send_initial_after_handshake: bool,

    /// How many times the Initial packet is sent after the handshake
    #[arg(
        long,
        default_value_t = DEFAULT_INITIAL_RETRANSMIT_COUNT,
        requires = "send_initial_after_handshake"
    )]
    pub initial_retransmit_count: u32,

    /// Number of trials launched concurrently
    #[arg(long, short = 'r', alias = "repeatCnt", default_value_t = DEFAULT_REPEAT_COUNT)]
    pub repeat_count: NonZeroU32,

    /// Max idle timeout override, 0 keeps the transport default
    #[arg(long, default_value = DEFAULT_MAX_IDLE_TIMEOUT, value_parser = parse_duration)]
    pub max_idle_timeout: Duration,

    /// Timeout of a single request, covering the handshake and the full body read
    #[arg(long, short = 't', default_value = DEFAULT_REQUEST_TIMEOUT, value_parser = parse_duration)]
    pub timeout: Duration,

    /// Additional trusted root certificates (PEM)
    #[arg(long = "ca-cert")]
    pub ca_certs: Vec<PathBuf>,

    /// Write a trace level log to the given file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Target addresses, e.g. https://localhost:6121/demo/tile
    pub addresses: Vec<String>,
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    let value = value.trim().to_lowercase();
    if value == "0" || value == "none" || value == "default" {
        return Ok(Duration::ZERO);
    }

    humantime::parse_duration(&value)
}

impl Args {
    pub fn trial_parameters(&self) -> Result<TrialParameters, HarnessError> {
        TrialParameters::builder()
            .verbose(self.verbose)
            .quiet(self.quiet)
            .insecure_skip_verify(self.insecure)
            .enable_tracing(self.qlog)
            .only_send_initial(self.only_send_initial)
            .send_initial_after_handshake(self.send_initial_after_handshake)
            .initial_retransmit_count(self.initial_retransmit_count)
            .max_idle_timeout(self.max_idle_timeout)
            .maybe_key_log_path(self.key_log_path.clone())
            .trace_dir(self.qlog_dir.clone())
            .build()
    }
}
