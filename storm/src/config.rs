use crate::certs::SharedCertPool;
use crate::error::HarnessError;
use crate::keylog::KeyLogSink;
use crate::params::TrialParameters;
use crate::qlog::TraceSinkFactory;
use crate::transport::{Transport, TransportFactory, TransportSettings};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOutput {
    /// Keep the body so it can be printed.
    Full,
    /// Drain the body, only its size is reported.
    ByteCount,
}

/// Transport client and sinks owned by a single trial. Released by `close`,
/// or on drop if the trial never got that far.
pub struct TransportConfig {
    trial_id: u32,
    transport: Arc<dyn Transport>,
    key_log: Option<Arc<KeyLogSink>>,
    tracer: Option<Arc<TraceSinkFactory>>,
    body_output: BodyOutput,
    released: bool,
}

impl TransportConfig {
    /// Opens the sinks requested by the parameters and creates the transport client.
    /// Creates files on disk, never touches the network.
    pub fn build(
        trial_id: u32,
        params: &TrialParameters,
        cert_pool: &SharedCertPool,
        factory: &dyn TransportFactory,
    ) -> Result<Self, HarnessError> {
        let key_log = params
            .key_log_path()
            .map(KeyLogSink::open)
            .transpose()?
            .map(Arc::new);

        let tracer = params
            .enable_tracing()
            .then(|| Arc::new(TraceSinkFactory::new(params.trace_dir(), trial_id)));

        let settings = TransportSettings {
            trial_id,
            roots: cert_pool.clone(),
            verbose: params.verbose(),
            insecure_skip_verify: params.insecure_skip_verify(),
            key_log: key_log.clone(),
            tracer: tracer.clone(),
            only_send_initial: params.only_send_initial(),
            initial_replays: params.initial_replays(),
            max_idle_timeout: params.idle_timeout_override(),
        };
        debug!("Trial #{trial_id} transport settings: {settings:?}");
        let transport = factory.create_transport(settings)?;

        let body_output = if params.quiet() {
            BodyOutput::ByteCount
        } else {
            BodyOutput::Full
        };

        Ok(Self {
            trial_id,
            transport,
            key_log,
            tracer,
            body_output,
            released: false,
        })
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn body_output(&self) -> BodyOutput {
        self.body_output
    }

    pub fn trace_files(&self) -> usize {
        self.tracer.as_ref().map_or(0, |tracer| tracer.created())
    }

    /// Closes the transport client and flushes the sinks.
    pub async fn close(mut self) {
        self.transport.close().await;
        self.release_sinks();
        if let Some(key_log) = &self.key_log {
            debug!(
                "Trial #{} wrote {} key log line(s) to {}",
                self.trial_id,
                key_log.lines_written(),
                key_log.path().display()
            );
        }
        if self.tracer.is_some() {
            info!(
                "Trial #{} created {} qlog file(s).",
                self.trial_id,
                self.trace_files()
            );
        }
    }

    fn release_sinks(&mut self) {
        if self.released {
            return;
        }

        self.released = true;
        if let Some(key_log) = &self.key_log {
            key_log.flush();
        }
    }
}

impl Drop for TransportConfig {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Trial #{} transport configuration dropped without being closed.",
                self.trial_id
            );
            self.release_sinks();
        }
    }
}
