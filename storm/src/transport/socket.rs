use quinn::udp::{RecvMeta, Transmit};
use quinn::{AsyncUdpSocket, UdpPoller};
use std::fmt::{Display, Formatter};
use std::io::{self, IoSliceMut};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

const QUIC_V2: u32 = 0x6b33_43cf;
const MAX_CID_LENGTH: usize = 20;

/// Destination connection ID the client chose for its first Initial packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionId(Vec<u8>);

impl ConnectionId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Returns the destination connection ID when the datagram starts with a long header Initial packet.
pub fn parse_initial(datagram: &[u8]) -> Option<ConnectionId> {
    let first = *datagram.first()?;
    if first & 0x80 == 0 {
        return None;
    }

    let version = u32::from_be_bytes(datagram.get(1..5)?.try_into().ok()?);
    let packet_type = (first & 0x30) >> 4;
    let is_initial = match version {
        0 => false,
        QUIC_V2 => packet_type == 0b01,
        _ => packet_type == 0b00,
    };
    if !is_initial {
        return None;
    }

    let length = *datagram.get(5)? as usize;
    if length > MAX_CID_LENGTH {
        return None;
    }

    datagram
        .get(6..6 + length)
        .map(|id| ConnectionId(id.to_vec()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Every datagram reaches the wire.
    Forward,
    /// Only the first Initial datagram reaches the wire, everything after it is swallowed.
    FirstInitialOnly,
}

#[derive(Debug, Clone)]
struct CapturedInitial {
    destination: SocketAddr,
    contents: Vec<u8>,
}

/// UDP socket wrapper recording the first Initial datagram a QUIC client sends,
/// so it can be suppressed around or replayed after the handshake.
#[derive(Debug)]
pub struct CapturingSocket {
    inner: Arc<dyn AsyncUdpSocket>,
    policy: SendPolicy,
    initial: Mutex<Option<CapturedInitial>>,
    captured: watch::Sender<Option<ConnectionId>>,
    sent: AtomicU64,
    suppressed: AtomicU64,
}

impl CapturingSocket {
    pub fn new(inner: Arc<dyn AsyncUdpSocket>, policy: SendPolicy) -> Self {
        Self {
            inner,
            policy,
            initial: Mutex::new(None),
            captured: watch::Sender::new(None),
            sent: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Acquire)
    }

    /// Resolves with the connection ID once the first Initial has been sent.
    pub async fn wait_for_initial(&self) -> Option<ConnectionId> {
        let mut receiver = self.captured.subscribe();
        let captured = receiver.wait_for(|id| id.is_some()).await.ok()?;
        captured.clone()
    }

    /// Sends the captured Initial datagram `count` times, returning how many went out.
    pub fn replay_initial(&self, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }

        let captured = self
            .initial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(captured) = captured else {
            warn!("No Initial packet has been captured, nothing to replay.");
            return 0;
        };

        let transmit = Transmit {
            destination: captured.destination,
            ecn: None,
            contents: &captured.contents,
            segment_size: None,
            src_ip: None,
        };
        let mut replayed = 0;
        for _ in 0..count {
            match self.inner.try_send(&transmit) {
                Ok(()) => {
                    replayed += 1;
                    self.sent.fetch_add(1, Ordering::AcqRel);
                }
                Err(error) => warn!("Failed to replay the Initial packet: {error}"),
            }
        }
        replayed
    }

    fn observe(&self, transmit: &Transmit) -> bool {
        let mut initial = self.initial.lock().unwrap_or_else(PoisonError::into_inner);
        if initial.is_some() {
            return self.policy == SendPolicy::Forward;
        }

        if let Some(id) = parse_initial(transmit.contents) {
            debug!(
                "Captured Initial packet ({} bytes) for connection: {id}",
                transmit.contents.len()
            );
            *initial = Some(CapturedInitial {
                destination: transmit.destination,
                contents: transmit.contents.to_vec(),
            });
            self.captured.send_replace(Some(id));
        }
        true
    }
}

impl AsyncUdpSocket for CapturingSocket {
    fn create_io_poller(self: Arc<Self>) -> Pin<Box<dyn UdpPoller>> {
        self.inner.clone().create_io_poller()
    }

    fn try_send(&self, transmit: &Transmit) -> io::Result<()> {
        if !self.observe(transmit) {
            trace!(
                "Suppressed a {} byte datagram to {}",
                transmit.contents.len(),
                transmit.destination
            );
            self.suppressed.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        self.inner.try_send(transmit)?;
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn poll_recv(
        &self,
        cx: &mut Context,
        bufs: &mut [IoSliceMut<'_>],
        meta: &mut [RecvMeta],
    ) -> Poll<io::Result<usize>> {
        self.inner.poll_recv(cx, bufs, meta)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    // One datagram per transmit, so every Initial is observed on its own.
    fn max_transmit_segments(&self) -> usize {
        1
    }

    fn max_receive_segments(&self) -> usize {
        self.inner.max_receive_segments()
    }

    fn may_fragment(&self) -> bool {
        self.inner.may_fragment()
    }
}
