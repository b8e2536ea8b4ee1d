//! Artefact downloads over HTTP

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Failure of a single download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("writing {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fetches a URL into a local file.
///
/// Implementations must not leave a file at `destination` unless the download
/// completed successfully.
pub trait Downloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), DownloadError>;
}

/// Blocking HTTP downloader.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("edge-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(DownloadError::Client)?;

        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), DownloadError> {
        tracing::debug!(url, destination = %destination.display(), "downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        // Stage into a sibling file so a partial body never lands at the
        // destination.
        let partial = partial_path(destination);
        let result = File::create(&partial)
            .and_then(|mut file| response.copy_to(&mut file).map_err(io::Error::other))
            .and_then(|_| fs::rename(&partial, destination));

        if let Err(source) = result {
            let _ = fs::remove_file(&partial);
            return Err(DownloadError::Io {
                path: destination.to_path_buf(),
                source,
            });
        }

        tracing::debug!(url, "download complete");
        Ok(())
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
