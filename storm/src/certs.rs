use crate::error::HarnessError;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trusted roots shared read-only by every trial of a run.
pub type SharedCertPool = Arc<RootCertStore>;

/// Loads the platform roots and augments them with the provided test roots.
/// Must be called once, before any trial starts.
pub fn load_trusted_roots(extra_roots: &[PathBuf]) -> Result<SharedCertPool, HarnessError> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        warn!("Native root certificate error: {error}");
    }

    if native.certs.is_empty() && !native.errors.is_empty() {
        let reason = native
            .errors
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(HarnessError::CannotLoadRootCertificates(reason));
    }

    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!("Loaded {added} native root certificates, ignored {ignored}.");

    for path in extra_roots {
        let added = add_pem_roots(&mut roots, path)?;
        info!("Added {added} trusted root certificate(s) from: {}", path.display());
    }

    Ok(Arc::new(roots))
}

/// Adds every certificate from a PEM file to the store, failing on the first invalid one.
pub fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<usize, HarnessError> {
    let file =
        File::open(path).map_err(|error| HarnessError::CannotReadCertificate(path.into(), error))?;
    let mut reader = BufReader::new(file);
    let certificates = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|error| HarnessError::CannotReadCertificate(path.into(), error))?;
    if certificates.is_empty() {
        return Err(HarnessError::InvalidCertificate(
            path.into(),
            "no certificates found".to_owned(),
        ));
    }

    let count = certificates.len();
    for certificate in certificates {
        roots
            .add(certificate)
            .map_err(|error| HarnessError::InvalidCertificate(path.into(), error.to_string()))?;
    }

    Ok(count)
}
