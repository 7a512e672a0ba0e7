pub mod quic;
pub mod socket;
pub mod tls;

use crate::certs::SharedCertPool;
use crate::error::{HarnessError, RequestError};
use crate::keylog::KeyLogSink;
use crate::qlog::TraceSinkFactory;
use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Everything a transport needs to know about one trial, mapped one-to-one from its parameters.
#[derive(Clone)]
pub struct TransportSettings {
    pub trial_id: u32,
    pub roots: SharedCertPool,
    pub verbose: bool,
    pub insecure_skip_verify: bool,
    pub key_log: Option<Arc<KeyLogSink>>,
    pub tracer: Option<Arc<TraceSinkFactory>>,
    pub only_send_initial: bool,
    pub initial_replays: Option<u32>,
    pub max_idle_timeout: Option<Duration>,
}

impl Debug for TransportSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSettings")
            .field("trial_id", &self.trial_id)
            .field("roots", &self.roots.len())
            .field("verbose", &self.verbose)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("key_log", &self.key_log.as_ref().map(|sink| sink.path()))
            .field("tracer", &self.tracer.as_ref().map(|tracer| tracer.dir()))
            .field("only_send_initial", &self.only_send_initial)
            .field("initial_replays", &self.initial_replays)
            .field("max_idle_timeout", &self.max_idle_timeout)
            .finish()
    }
}

/// Creates the transport client of a trial.
pub trait TransportFactory: Send + Sync {
    fn create_transport(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, HarnessError>;
}

/// A client able to perform GET requests. Owned by exactly one trial.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, uri: &Uri) -> Result<Response, RequestError>;

    /// Releases every connection and socket opened so far. Called once per trial.
    async fn close(&self);
}

/// Response whose body is streamed chunk by chunk.
pub struct Response {
    pub status: u16,
    pub body: Box<dyn ResponseBody>,
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ResponseBody: Send {
    /// Next chunk of the body, `None` once it has been fully received.
    async fn chunk(&mut self) -> Result<Option<Bytes>, RequestError>;
}
