use async_trait::async_trait;
use bytes::Bytes;
use h3_storm::error::{HarnessError, RequestError};
use h3_storm::transport::{Response, ResponseBody, Transport, TransportFactory, TransportSettings};
use http::Uri;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the mock transport answers a given address.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Responds with `bytes` bytes of body, streamed in chunks of `chunk_size`.
    Respond { status: u16, bytes: usize, chunk_size: usize },
    /// Waits before responding like `Respond`.
    Delayed { delay: Duration, bytes: usize },
    /// Fails before any response is produced.
    Fail(RequestError),
    /// Responds, then fails after streaming `after` bytes of body.
    FailRead { after: usize },
    /// Never responds.
    Hang,
    /// Panics inside the request.
    Panic,
}

impl Behavior {
    pub fn ok(bytes: usize) -> Self {
        Behavior::Respond {
            status: 200,
            bytes,
            chunk_size: 64,
        }
    }
}

/// Counters shared by every transport a factory created.
#[derive(Debug, Default)]
pub struct MockStats {
    pub transports_created: AtomicUsize,
    pub transports_closed: AtomicUsize,
    pub requests: AtomicUsize,
    pub bodies_drained: AtomicUsize,
    pub settings: Mutex<Vec<TransportSettings>>,
}

impl MockStats {
    pub fn created(&self) -> usize {
        self.transports_created.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> usize {
        self.transports_closed.load(Ordering::Acquire)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    pub fn drained(&self) -> usize {
        self.bodies_drained.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct MockTransportFactory {
    behaviors: Arc<HashMap<String, Behavior>>,
    fallback: Behavior,
    fail_creation_for: Option<u32>,
    panic_creation_for: Option<u32>,
    pub stats: Arc<MockStats>,
}

impl MockTransportFactory {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            behaviors: Arc::new(HashMap::new()),
            fallback,
            fail_creation_for: None,
            panic_creation_for: None,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn with(mut self, address: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.behaviors).insert(address.to_owned(), behavior);
        self
    }

    /// Fails the transport creation of the given trial, or of every trial with `0`.
    pub fn failing_creation(mut self, trial_id: u32) -> Self {
        self.fail_creation_for = Some(trial_id);
        self
    }

    /// Panics while creating the transport of the given trial.
    pub fn panicking_creation(mut self, trial_id: u32) -> Self {
        self.panic_creation_for = Some(trial_id);
        self
    }
}

impl TransportFactory for MockTransportFactory {
    fn create_transport(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, HarnessError> {
        if self.panic_creation_for == Some(settings.trial_id) {
            panic!("mock factory panicked for trial #{}", settings.trial_id);
        }

        if matches!(self.fail_creation_for, Some(id) if id == 0 || id == settings.trial_id) {
            return Err(HarnessError::CannotCreateTransport(format!(
                "mock refused trial #{}",
                settings.trial_id
            )));
        }

        self.stats.transports_created.fetch_add(1, Ordering::AcqRel);
        self.stats.settings.lock().unwrap().push(settings);
        Ok(Arc::new(MockTransport {
            behaviors: self.behaviors.clone(),
            fallback: self.fallback.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct MockTransport {
    behaviors: Arc<HashMap<String, Behavior>>,
    fallback: Behavior,
    stats: Arc<MockStats>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, uri: &Uri) -> Result<Response, RequestError> {
        self.stats.requests.fetch_add(1, Ordering::AcqRel);
        let behavior = self
            .behaviors
            .get(&uri.to_string())
            .unwrap_or(&self.fallback)
            .clone();
        match behavior {
            Behavior::Respond {
                status,
                bytes,
                chunk_size,
            } => Ok(self.respond(status, bytes, chunk_size, None)),
            Behavior::Delayed { delay, bytes } => {
                tokio::time::sleep(delay).await;
                Ok(self.respond(200, bytes, 64, None))
            }
            Behavior::Fail(error) => Err(error),
            Behavior::FailRead { after } => Ok(self.respond(200, after, 16, Some(after))),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behavior::Panic => panic!("mock transport panicked for {uri}"),
        }
    }

    async fn close(&self) {
        self.stats.transports_closed.fetch_add(1, Ordering::AcqRel);
    }
}

impl MockTransport {
    fn respond(
        &self,
        status: u16,
        bytes: usize,
        chunk_size: usize,
        fail_after: Option<usize>,
    ) -> Response {
        Response {
            status,
            body: Box::new(MockBody {
                remaining: bytes,
                chunk_size: chunk_size.max(1),
                fail_after,
                stats: self.stats.clone(),
            }),
        }
    }
}

struct MockBody {
    remaining: usize,
    chunk_size: usize,
    fail_after: Option<usize>,
    stats: Arc<MockStats>,
}

#[async_trait]
impl ResponseBody for MockBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>, RequestError> {
        if self.remaining == 0 {
            if self.fail_after.is_some() {
                return Err(RequestError::Read("mock stream reset".to_owned()));
            }
            self.stats.bodies_drained.fetch_add(1, Ordering::AcqRel);
            return Ok(None);
        }

        tokio::task::yield_now().await;
        let size = self.remaining.min(self.chunk_size);
        self.remaining -= size;
        Ok(Some(Bytes::from(vec![b'x'; size])))
    }
}
