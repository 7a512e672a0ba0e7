use crate::config::{BodyOutput, TransportConfig};
use crate::error::RequestError;
use crate::transport::Transport;
use crate::utils::latch::CompletionLatch;
use bytes::{Bytes, BytesMut};
use http::Uri;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Successful exchange with a fully drained body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub bytes: u64,
    /// Present unless the body output is [`BodyOutput::ByteCount`].
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub address: String,
    pub result: Result<Delivery, RequestError>,
}

impl RequestOutcome {
    pub fn failed(address: &str, error: RequestError) -> Self {
        Self {
            address: address.to_owned(),
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Issues one request per address concurrently and returns one outcome per address,
/// in input order, once every request has resolved.
pub async fn dispatch(
    config: &TransportConfig,
    addresses: &[String],
    timeout: Duration,
) -> Vec<RequestOutcome> {
    let (latch, guards) = CompletionLatch::new(addresses.len());
    let output = config.body_output();
    let mut tasks = JoinSet::new();
    let mut indices = HashMap::with_capacity(addresses.len());
    for ((index, address), guard) in addresses.iter().enumerate().zip(guards) {
        info!("GET {address}");
        let transport = config.transport();
        let address = address.clone();
        let handle = tasks.spawn(async move {
            let _guard = guard;
            let result = perform(transport.as_ref(), &address, timeout, output).await;
            (index, result)
        });
        indices.insert(handle.id(), index);
    }

    latch.wait().await;
    debug!("All {} request(s) resolved.", latch.completed());

    let mut slots: Vec<Option<Result<Delivery, RequestError>>> = vec![None; addresses.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(error) => {
                let Some(&index) = indices.get(&error.id()) else {
                    error!("Unknown request task {} failed: {error}", error.id());
                    continue;
                };
                let reason = task_failure(error);
                error!("Request for {} panicked: {reason}", addresses[index]);
                slots[index] = Some(Err(RequestError::Panicked(reason)));
            }
        }
    }

    addresses
        .iter()
        .zip(slots)
        .map(|(address, slot)| {
            let result = slot.unwrap_or_else(|| {
                error!("No outcome was recorded for {address}");
                Err(RequestError::Missing)
            });
            RequestOutcome {
                address: address.clone(),
                result,
            }
        })
        .collect()
}

async fn perform(
    transport: &dyn Transport,
    address: &str,
    timeout: Duration,
    output: BodyOutput,
) -> Result<Delivery, RequestError> {
    let uri = address
        .parse::<Uri>()
        .map_err(|error| RequestError::InvalidAddress(format!("{address}: {error}")))?;
    let result = match tokio::time::timeout(timeout, exchange(transport, &uri, output)).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::Timeout(timeout)),
    };
    if let Err(error) = &result {
        warn!("Request for {address} failed: {error}");
    }
    result
}

/// The body is always read to the end, even when only its size is reported.
async fn exchange(
    transport: &dyn Transport,
    uri: &Uri,
    output: BodyOutput,
) -> Result<Delivery, RequestError> {
    let mut response = transport.get(uri).await?;
    info!("Got response for {uri}: {}", response.status);

    let mut bytes = 0;
    let mut body = match output {
        BodyOutput::Full => Some(BytesMut::new()),
        BodyOutput::ByteCount => None,
    };
    while let Some(chunk) = response.body.chunk().await? {
        bytes += chunk.len() as u64;
        if let Some(body) = body.as_mut() {
            body.extend_from_slice(&chunk);
        }
    }

    Ok(Delivery {
        status: response.status,
        bytes,
        body: body.map(BytesMut::freeze),
    })
}

/// Reason of a task that did not return, the panic message when there is one.
pub(crate) fn task_failure(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(reason) = payload.downcast_ref::<&str>() {
        return (*reason).to_owned();
    }

    match payload.downcast::<String>() {
        Ok(reason) => *reason,
        Err(_) => "unknown panic".to_owned(),
    }
}
