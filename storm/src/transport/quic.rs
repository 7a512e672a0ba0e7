use crate::error::{HarnessError, RequestError};
use crate::qlog::TraceSink;
use crate::transport::socket::{CapturingSocket, SendPolicy};
use crate::transport::tls::client_crypto;
use crate::transport::{Response, ResponseBody, Transport, TransportFactory, TransportSettings};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::future::{join_all, poll_fn};
use h3::client::{RequestStream, SendRequest};
use http::{Request, Uri};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{
    ClientConfig, Connection, Endpoint, EndpointConfig, IdleTimeout, Runtime, TokioRuntime,
    TransportConfig, VarInt,
};
use serde_json::{json, Value};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_HTTPS_PORT: u16 = 443;
const H3_NO_ERROR: u32 = 0x100;
const ENDPOINT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type H3Driver = h3::client::Connection<h3_quinn::Connection, Bytes>;
type H3SendRequest = SendRequest<h3_quinn::OpenStreams, Bytes>;
type H3RequestStream = RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

/// Creates HTTP/3 clients on top of quinn.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuicTransportFactory;

impl TransportFactory for QuicTransportFactory {
    fn create_transport(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, HarnessError> {
        Ok(Arc::new(QuicTransport::create(settings)?))
    }
}

/// HTTP/3 client of a single trial. Every request gets its own UDP endpoint so the
/// first Initial packet of each handshake can be observed, suppressed or replayed.
pub struct QuicTransport {
    settings: TransportSettings,
    client_config: ClientConfig,
    runtime: Arc<TokioRuntime>,
    endpoints: Mutex<Vec<Endpoint>>,
}

impl QuicTransport {
    pub fn create(settings: TransportSettings) -> Result<Self, HarnessError> {
        let client_config = configure(&settings)?;
        Ok(Self {
            settings,
            client_config,
            runtime: Arc::new(TokioRuntime),
            endpoints: Mutex::new(Vec::new()),
        })
    }

    fn open_endpoint(
        &self,
        remote: SocketAddr,
    ) -> Result<(Endpoint, Arc<CapturingSocket>), RequestError> {
        let bind_address: SocketAddr = if remote.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let socket = std::net::UdpSocket::bind(bind_address)
            .map_err(|error| RequestError::Endpoint(error.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|error| RequestError::Endpoint(error.to_string()))?;
        let inner = self
            .runtime
            .wrap_udp_socket(socket)
            .map_err(|error| RequestError::Endpoint(error.to_string()))?;
        let policy = if self.settings.only_send_initial {
            SendPolicy::FirstInitialOnly
        } else {
            SendPolicy::Forward
        };

        let socket = Arc::new(CapturingSocket::new(inner, policy));
        let endpoint = Endpoint::new_with_abstract_socket(
            EndpointConfig::default(),
            None,
            socket.clone(),
            self.runtime.clone(),
        )
        .map_err(|error| {
            error!("Cannot create client endpoint: {error}");
            RequestError::Endpoint(error.to_string())
        })?;
        Ok((endpoint, socket))
    }

    async fn open_trace(&self, socket: &CapturingSocket) -> Option<TraceSink> {
        let tracer = self.settings.tracer.as_ref()?;
        let connection_id = socket.wait_for_initial().await?;
        match tracer.create(connection_id.as_bytes()) {
            Ok(mut sink) => {
                sink.record(
                    "transport:initial_captured",
                    json!({ "odcid": connection_id.to_string() }),
                );
                Some(sink)
            }
            Err(error) => {
                warn!(
                    "Cannot create qlog file for connection {connection_id}, continuing without it: {error}"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn get(&self, uri: &Uri) -> Result<Response, RequestError> {
        let target = Target::from_uri(uri)?;
        let remote = target.resolve().await?;
        let (endpoint, socket) = self.open_endpoint(remote)?;
        self.endpoints.lock().await.push(endpoint.clone());

        let connecting = endpoint
            .connect_with(self.client_config.clone(), remote, &target.server_name)
            .map_err(|error| RequestError::Connect(error.to_string()))?;
        let mut trace = self.open_trace(&socket).await;
        if let Some(sink) = trace.as_mut() {
            sink.record(
                "connectivity:connection_started",
                json!({ "dst": remote.to_string(), "uri": uri.to_string() }),
            );
        }

        let connection = match connecting.await {
            Ok(connection) => connection,
            Err(error) => {
                if let Some(mut sink) = trace.take() {
                    sink.record(
                        "connectivity:connection_closed",
                        json!({ "reason": error.to_string() }),
                    );
                    sink.finish();
                }
                return Err(RequestError::Connect(error.to_string()));
            }
        };

        debug!(
            "Trial #{} connected to {remote} for {uri}",
            self.settings.trial_id
        );
        let (driver, mut send_request) = h3::client::new(h3_quinn::Connection::new(
            connection.clone(),
        ))
        .await
        .map_err(|error| RequestError::Connect(error.to_string()))?;
        let mut session = Session {
            connection,
            socket,
            driver: tokio::spawn(drive(driver)),
            trace,
            verbose: self.settings.verbose,
            uri: uri.to_string(),
            closed: false,
        };
        session.record(
            "security:handshake_completed",
            json!({ "remote": remote.to_string() }),
        );

        if let Some(count) = self.settings.initial_replays {
            let sent = session.socket.replay_initial(count);
            debug!("Replayed the Initial packet {sent}/{count} time(s) for {uri}");
            session.record(
                "transport:initial_replayed",
                json!({ "requested": count, "sent": sent }),
            );
        }

        let request = Request::get(uri.clone())
            .body(())
            .map_err(|error| RequestError::Request(error.to_string()))?;
        let mut stream = send_request
            .send_request(request)
            .await
            .map_err(|error| RequestError::Request(error.to_string()))?;
        stream
            .finish()
            .await
            .map_err(|error| RequestError::Request(error.to_string()))?;
        let response = stream
            .recv_response()
            .await
            .map_err(|error| RequestError::Request(error.to_string()))?;

        let status = response.status().as_u16();
        session.record("http:response_received", json!({ "status": status }));
        Ok(Response {
            status,
            body: Box::new(QuicBody {
                stream,
                _send_request: send_request,
                session,
                received: 0,
            }),
        })
    }

    async fn close(&self) {
        let endpoints = std::mem::take(&mut *self.endpoints.lock().await);
        if endpoints.is_empty() {
            return;
        }

        for endpoint in &endpoints {
            endpoint.close(VarInt::from_u32(H3_NO_ERROR), b"trial finished");
        }

        let idle = join_all(endpoints.iter().map(|endpoint| endpoint.wait_idle()));
        if timeout(ENDPOINT_DRAIN_TIMEOUT, idle).await.is_err() {
            warn!(
                "Trial #{}: {} endpoint(s) did not drain within {ENDPOINT_DRAIN_TIMEOUT:?}",
                self.settings.trial_id,
                endpoints.len()
            );
        }
        debug!(
            "Trial #{} closed {} endpoint(s).",
            self.settings.trial_id,
            endpoints.len()
        );
    }
}

/// Applies the trial settings onto a quinn client configuration.
pub fn configure(settings: &TransportSettings) -> Result<ClientConfig, HarnessError> {
    let mut transport = TransportConfig::default();
    if let Some(max_idle_timeout) = settings.max_idle_timeout {
        let max_idle_timeout = IdleTimeout::try_from(max_idle_timeout).map_err(|_| {
            error!("Invalid 'max_idle_timeout': {max_idle_timeout:?}");
            HarnessError::InvalidConfiguration(format!(
                "max idle timeout {max_idle_timeout:?} is out of range"
            ))
        })?;
        transport.max_idle_timeout(Some(max_idle_timeout));
    }

    let crypto = client_crypto(settings)?;
    let crypto = QuicClientConfig::try_from(crypto).map_err(|error| {
        error!("Failed to create QUIC client configuration: {error}");
        HarnessError::InvalidConfiguration(error.to_string())
    })?;
    let mut client_config = ClientConfig::new(Arc::new(crypto));
    client_config.transport_config(Arc::new(transport));
    Ok(client_config)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
    server_name: String,
}

impl Target {
    fn from_uri(uri: &Uri) -> Result<Self, RequestError> {
        if uri.scheme_str() != Some("https") {
            return Err(RequestError::InvalidAddress(format!(
                "{uri}: only https addresses are supported"
            )));
        }

        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| RequestError::InvalidAddress(format!("{uri}: missing host")))?;
        let server_name = host.trim_start_matches('[').trim_end_matches(']');
        let host = if server_name.contains(':') {
            format!("[{server_name}]")
        } else {
            server_name.to_owned()
        };
        Ok(Self {
            host,
            port: uri.port_u16().unwrap_or(DEFAULT_HTTPS_PORT),
            server_name: server_name.to_owned(),
        })
    }

    fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn resolve(&self) -> Result<SocketAddr, RequestError> {
        let authority = self.authority();
        let mut addresses = tokio::net::lookup_host(authority.clone())
            .await
            .map_err(|error| RequestError::Resolve(format!("{authority}: {error}")))?;
        addresses
            .next()
            .ok_or_else(|| RequestError::Resolve(format!("{authority}: no addresses found")))
    }
}

async fn drive(mut driver: H3Driver) {
    if let Err(error) = poll_fn(|cx| driver.poll_close(cx)).await {
        trace!("HTTP/3 connection closed: {error}");
    }
}

/// Connection state of one request, torn down exactly once.
struct Session {
    connection: Connection,
    socket: Arc<CapturingSocket>,
    driver: JoinHandle<()>,
    trace: Option<TraceSink>,
    verbose: bool,
    uri: String,
    closed: bool,
}

impl Session {
    fn record(&mut self, name: &str, data: Value) {
        if let Some(sink) = self.trace.as_mut() {
            sink.record(name, data);
        }
    }

    fn close(&mut self, reason: &str) {
        if self.closed {
            return;
        }

        self.closed = true;
        let stats = self.connection.stats();
        let summary = json!({
            "reason": reason,
            "rtt_ms": stats.path.rtt.as_secs_f64() * 1000.0,
            "sent_packets": stats.path.sent_packets,
            "lost_packets": stats.path.lost_packets,
            "udp_tx_datagrams": stats.udp_tx.datagrams,
            "udp_rx_datagrams": stats.udp_rx.datagrams,
            "socket_sent": self.socket.sent(),
            "socket_suppressed": self.socket.suppressed(),
        });
        if self.verbose {
            info!("Connection for {} closed ({reason}): {summary}", self.uri);
        } else {
            debug!("Connection for {} closed ({reason}): {summary}", self.uri);
        }

        self.record("connectivity:connection_closed", summary);
        self.connection
            .close(VarInt::from_u32(H3_NO_ERROR), reason.as_bytes());
        if let Some(sink) = self.trace.take() {
            sink.finish();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close("abandoned");
        self.driver.abort();
    }
}

struct QuicBody {
    stream: H3RequestStream,
    _send_request: H3SendRequest,
    session: Session,
    received: u64,
}

#[async_trait]
impl ResponseBody for QuicBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>, RequestError> {
        match self.stream.recv_data().await {
            Ok(Some(mut chunk)) => {
                let bytes = chunk.copy_to_bytes(chunk.remaining());
                self.received += bytes.len() as u64;
                Ok(Some(bytes))
            }
            Ok(None) => {
                self.session
                    .record("harness:body_drained", json!({ "bytes": self.received }));
                self.session.close("done");
                Ok(None)
            }
            Err(error) => {
                self.session.record(
                    "harness:body_failed",
                    json!({ "bytes": self.received, "reason": error.to_string() }),
                );
                self.session.close("read failed");
                Err(RequestError::Read(error.to_string()))
            }
        }
    }
}
