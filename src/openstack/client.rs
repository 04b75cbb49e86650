//! Authenticated JSON client bound to one service endpoint.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::ApiError;

const AUTH_HEADER: &str = "X-Auth-Token";

/// Client for a single catalog endpoint, carrying the session token and any
/// per-service headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceClient {
    endpoint: String,
    token: String,
    headers: Vec<(&'static str, String)>,
}

impl ServiceClient {
    /// Creates a client for `endpoint` authenticated with `token`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            token: token.into(),
            headers: Vec::new(),
        }
    }

    /// Returns the endpoint without a trailing slash.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sets a header sent with every request, replacing any previous value.
    pub fn set_header(&mut self, name: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Returns a copy of the client with an extra header set.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Returns the value of a configured header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Joins a relative path onto the endpoint.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Issues `GET` against a path relative to the endpoint and decodes JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_url_json(&self.url(path)).await
    }

    /// Issues `GET` against an absolute URL and decodes JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn get_url_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let body = self.send(Method::GET, url, None::<&()>).await?;
        decode(url, &body)
    }

    /// Issues `POST` with a JSON body and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(Method::POST, &url, Some(body)).await?;
        decode(&url, &response)
    }

    /// Issues `POST` with a JSON body and discards the response body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-success status.
    pub async fn post_action<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(Method::POST, &self.url(path), Some(body))
            .await
            .map(drop)
    }

    /// Issues `DELETE` against a path relative to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-success status.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, &self.url(path), None::<&()>)
            .await
            .map(drop)
    }

    async fn send<B>(&self, method: Method, url: &str, body: Option<&B>) -> Result<Vec<u8>, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = super::HTTP_CLIENT
            .request(method, url)
            .header(AUTH_HEADER, &self.token)
            .header("Accept", "application/json");
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|err| ApiError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| ApiError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        })?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                url: url.to_owned(),
            });
        }
        Err(ApiError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

pub(super) fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::Decode {
        url: url.to_owned(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn canned_response(request_line: &str) -> (&'static str, &'static str) {
        if request_line.contains("/missing") {
            ("404 Not Found", r#"{"itemNotFound":{"code":404}}"#)
        } else if request_line.contains("/broken") {
            ("500 Internal Server Error", "boom")
        } else {
            ("200 OK", r#"{"snapshot":{"id":"snap-1"}}"#)
        }
    }

    /// Serves canned responses chosen by request path and returns the
    /// endpoint to point a client at.
    async fn canned_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buffer = vec![0_u8; 8192];
                let read = stream.read(&mut buffer).await.unwrap_or(0);
                let request = String::from_utf8_lossy(buffer.get(..read).unwrap_or_default());
                let request_line = request.lines().next().unwrap_or_default();
                let (status, body) = canned_response(request_line);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            }
        });
        format!("http://{addr}/v3/project")
    }

    #[tokio::test]
    async fn success_bodies_are_decoded() {
        let client = ServiceClient::new(canned_endpoint().await, "token");
        let body: serde_json::Value = client.get_json("snapshots/snap-1").await.expect("decoded");
        assert_eq!(body.pointer("/snapshot/id").and_then(serde_json::Value::as_str), Some("snap-1"));
    }

    #[tokio::test]
    async fn not_found_maps_to_its_own_variant() {
        let client = ServiceClient::new(canned_endpoint().await, "token");
        let err = client
            .get_json::<serde_json::Value>("snapshots/missing")
            .await
            .expect_err("404");
        assert!(err.is_not_found());
        assert_eq!(
            err,
            ApiError::NotFound {
                url: client.url("snapshots/missing"),
            }
        );
    }

    #[tokio::test]
    async fn other_failures_carry_status_and_body() {
        let client = ServiceClient::new(canned_endpoint().await, "token");
        let err = client.delete("volumes/broken").await.expect_err("500");
        assert_eq!(
            err,
            ApiError::Http {
                url: client.url("volumes/broken"),
                status: 500,
                body: String::from("boom"),
            }
        );
    }

    #[test]
    fn url_joins_without_duplicate_slashes() {
        let client = ServiceClient::new("https://cinder.example/v3/project/", "token");
        assert_eq!(client.endpoint(), "https://cinder.example/v3/project");
        assert_eq!(
            client.url("/snapshots/snap-1"),
            "https://cinder.example/v3/project/snapshots/snap-1"
        );
    }

    #[test]
    fn set_header_replaces_previous_value() {
        let mut client = ServiceClient::new("https://manila.example/v2", "token");
        client.set_header("X-OpenStack-Manila-API-Version", "2.7");
        client.set_header("X-OpenStack-Manila-API-Version", "2.45");
        assert_eq!(client.header("X-OpenStack-Manila-API-Version"), Some("2.45"));
        let experimental = client.clone().with_header("X-Extra", "True");
        assert_eq!(experimental.header("X-Extra"), Some("True"));
        assert_eq!(client.header("X-Extra"), None);
    }

    #[test]
    fn decode_reports_the_url() {
        let err = decode::<serde_json::Value>("https://api/x", b"not json")
            .expect_err("invalid json");
        assert!(matches!(err, ApiError::Decode { ref url, .. } if url == "https://api/x"));
    }
}
