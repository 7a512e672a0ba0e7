pub mod mock_transport;

use h3_storm::certs::SharedCertPool;
use rustls::RootCertStore;
use std::sync::Arc;

/// Trust store without any roots, the mock transports never verify anything.
pub fn empty_cert_pool() -> SharedCertPool {
    Arc::new(RootCertStore::empty())
}
