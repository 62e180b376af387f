use std::io::{self, Seek, SeekFrom, Write};
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use url::Url;

use super::{BlobReader, BlobSource, FetchError};

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "osmsync/0.1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Fetches `http://` and `https://` URIs.
///
/// Responses are spooled into an anonymous temporary file so decoders can read
/// them synchronously after the transfer has completed.
#[derive(Debug, Clone)]
pub struct HttpBlobSource {
    client: Client,
    user_agent: String,
}

impl HttpBlobSource {
    /// Build a source with the default timeouts.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Build a source whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|error| FetchError::Io {
                uri: String::new(),
                source: io::Error::other(error),
            })?;
        Ok(Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Override the default user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait(?Send)]
impl BlobSource for HttpBlobSource {
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError> {
        let response = self
            .client
            .get(uri.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|error| convert_reqwest_error(error, uri))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                uri: uri.to_string(),
            });
        }
        let response = response
            .error_for_status()
            .map_err(|error| convert_reqwest_error(error, uri))?;

        let mut spool = tempfile::tempfile().map_err(|source| FetchError::io(uri, source))?;
        let mut stream = pin!(response.bytes_stream());
        let mut total = 0_usize;
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|error| convert_reqwest_error(error, uri))?
        {
            spool
                .write_all(&chunk)
                .map_err(|source| FetchError::io(uri, source))?;
            total += chunk.len();
        }
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|source| FetchError::io(uri, source))?;
        debug!("fetched {total} bytes from {uri}");
        Ok(Box::new(io::BufReader::new(spool)))
    }
}

fn convert_reqwest_error(error: reqwest::Error, uri: &Url) -> FetchError {
    if let Some(status) = error.status() {
        if status == StatusCode::NOT_FOUND {
            return FetchError::NotFound {
                uri: uri.to_string(),
            };
        }
        return FetchError::Http {
            uri: uri.to_string(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    FetchError::Io {
        uri: uri.to_string(),
        source: io::Error::new(kind, error),
    }
}
