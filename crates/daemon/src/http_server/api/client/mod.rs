mod client;
mod error;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{Method, Request};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

pub use client::ApiClient;
pub use error::ApiError;

pub type ApiBody = Full<Bytes>;

/// A typed call against the daemon's HTTP API.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError>;
}

/// `GET` of `path` relative to `base_url`.
pub fn get(base_url: &Url, path: &str) -> Result<Request<ApiBody>, ApiError> {
    request(Method::GET, &base_url.join(path)?, None)
}

/// `POST` of `body` as JSON to `path` relative to `base_url`.
pub fn post_json<B: Serialize>(
    base_url: &Url,
    path: &str,
    body: &B,
) -> Result<Request<ApiBody>, ApiError> {
    let body = serde_json::to_vec(body)?;
    request(Method::POST, &base_url.join(path)?, Some(body))
}

/// Build an origin-form request for `url`; the connection itself is picked
/// by the client.
pub fn request(method: Method, url: &Url, body: Option<Vec<u8>>) -> Result<Request<ApiBody>, ApiError> {
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let mut builder = Request::builder()
        .method(method)
        .uri(target)
        .header(HOST, url.host_str().unwrap_or("localhost"));
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    Ok(builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_origin_form() {
        let base = Url::parse("http://localhost/").unwrap();
        let mut url = base.join("/api/v0/mounts/info").unwrap();
        url.query_pairs_mut().append_pair("mount_point", "/data/m1");

        let request = request(Method::GET, &url, None).unwrap();
        assert_eq!(
            request.uri().to_string(),
            "/api/v0/mounts/info?mount_point=%2Fdata%2Fm1"
        );
        assert_eq!(request.headers()[HOST], "localhost");
        assert!(request.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let base = Url::parse("http://127.0.0.1:7777/").unwrap();
        let request = post_json(&base, "/api/v0/mounts/unmount", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()[HOST], "127.0.0.1");
    }
}
