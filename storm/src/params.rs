use crate::args::defaults::DEFAULT_TRACE_DIR;
use crate::error::HarnessError;
use bon::bon;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Knobs describing how every trial of a run perturbs the transport.
/// Only constructible through the validating builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialParameters {
    verbose: bool,
    quiet: bool,
    insecure_skip_verify: bool,
    enable_tracing: bool,
    only_send_initial: bool,
    send_initial_after_handshake: bool,
    initial_retransmit_count: u32,
    max_idle_timeout: Duration,
    key_log_path: Option<PathBuf>,
    trace_dir: PathBuf,
}

#[bon]
impl TrialParameters {
    #[builder]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        #[builder(default)] verbose: bool,
        #[builder(default)] quiet: bool,
        #[builder(default)] insecure_skip_verify: bool,
        #[builder(default)] enable_tracing: bool,
        #[builder(default)] only_send_initial: bool,
        #[builder(default)] send_initial_after_handshake: bool,
        #[builder(default)] initial_retransmit_count: u32,
        #[builder(default)] max_idle_timeout: Duration,
        #[builder(into)] key_log_path: Option<PathBuf>,
        #[builder(into, default = PathBuf::from(DEFAULT_TRACE_DIR))] trace_dir: PathBuf,
    ) -> Result<Self, HarnessError> {
        if initial_retransmit_count > 0 && !send_initial_after_handshake {
            return Err(HarnessError::InvalidParameters(format!(
                "initial retransmit count {initial_retransmit_count} requires sending initial packets after the handshake"
            )));
        }

        if only_send_initial && send_initial_after_handshake {
            return Err(HarnessError::InvalidParameters(
                "only sending the initial packet never completes the handshake, so nothing can be sent after it".to_owned(),
            ));
        }

        if matches!(&key_log_path, Some(path) if path.as_os_str().is_empty()) {
            return Err(HarnessError::InvalidParameters(
                "key log path cannot be empty".to_owned(),
            ));
        }

        Ok(Self {
            verbose,
            quiet,
            insecure_skip_verify,
            enable_tracing,
            only_send_initial,
            send_initial_after_handshake,
            initial_retransmit_count,
            max_idle_timeout,
            key_log_path,
            trace_dir,
        })
    }
}

impl TrialParameters {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    pub fn enable_tracing(&self) -> bool {
        self.enable_tracing
    }

    pub fn only_send_initial(&self) -> bool {
        self.only_send_initial
    }

    pub fn send_initial_after_handshake(&self) -> bool {
        self.send_initial_after_handshake
    }

    pub fn initial_retransmit_count(&self) -> u32 {
        self.initial_retransmit_count
    }

    pub fn max_idle_timeout(&self) -> Duration {
        self.max_idle_timeout
    }

    pub fn key_log_path(&self) -> Option<&Path> {
        self.key_log_path.as_deref()
    }

    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    /// Number of extra Initial packets to send once the handshake completes,
    /// `None` when the post-handshake replay is disabled.
    pub fn initial_replays(&self) -> Option<u32> {
        self.send_initial_after_handshake
            .then_some(self.initial_retransmit_count)
    }

    /// `None` keeps the transport default.
    pub fn idle_timeout_override(&self) -> Option<Duration> {
        (!self.max_idle_timeout.is_zero()).then_some(self.max_idle_timeout)
    }
}
