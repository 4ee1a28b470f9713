use bytes::Bytes;
use http::Request;
use http_body_util::BodyExt;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use url::Url;

use super::error::ApiError;
use super::{ApiBody, ApiRequest};
use crate::process::ListenAddress;

/// Client for the daemon's HTTP API over its Unix socket or a TCP port.
///
/// Each call opens its own connection.
#[derive(Debug, Clone)]
pub struct ApiClient {
    address: ListenAddress,
    base_url: Url,
}

impl ApiClient {
    pub fn new(address: ListenAddress) -> Result<Self, ApiError> {
        let base_url = match &address {
            ListenAddress::Unix(_) => Url::parse("http://localhost/")?,
            ListenAddress::Tcp(addr) => Url::parse(&format!("http://{}/", addr))?,
        };
        Ok(Self { address, base_url })
    }

    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let request = request.build_request(&self.base_url)?;
        let (status, body) = match &self.address {
            ListenAddress::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                send(stream, request).await?
            }
            ListenAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                send(stream, request).await?
            }
        };

        if status.is_success() {
            Ok(serde_json::from_slice(&body)?)
        } else {
            Err(ApiError::HttpStatus(
                status,
                String::from_utf8_lossy(&body).into_owned(),
            ))
        }
    }

    fn connect_error(&self, source: std::io::Error) -> ApiError {
        ApiError::Connect {
            address: self.address.to_string(),
            source,
        }
    }
}

async fn send<S>(stream: S, request: Request<ApiBody>) -> Result<(http::StatusCode, Bytes), ApiError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "api connection closed with error");
        }
    });

    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}
