use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read cert file '{}': {source}", path.display())]
    CertFileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read key file '{}': {source}", path.display())]
    KeyFileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no valid certificates found in '{}'", .0.display())]
    NoCerts(PathBuf),
    #[error("no valid private key found in '{}'", .0.display())]
    NoKey(PathBuf),
    #[error("failed to build TLS config: {0}")]
    RustlsConfig(#[from] rustls::Error),
}

/// Builds the webhook's server-side TLS config from a PEM certificate chain
/// and private key. Client certificates are not requested.
pub fn load_tls_config(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = read_certs(cert_path.as_ref())?;
    let key = read_key(key_path.as_ref())?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let read_err = |source| TlsError::CertFileRead {
        path: path.to_path_buf(),
        source,
    };

    let data = fs::read(path).map_err(read_err)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(data.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;

    if certs.is_empty() {
        return Err(TlsError::NoCerts(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let read_err = |source| TlsError::KeyFileRead {
        path: path.to_path_buf(),
        source,
    };

    let data = fs::read(path).map_err(read_err)?;
    rustls_pemfile::private_key(&mut BufReader::new(data.as_slice()))
        .map_err(read_err)?
        .ok_or_else(|| TlsError::NoKey(path.to_path_buf()))
}
