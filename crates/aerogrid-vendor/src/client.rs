//! HTTP/JSON implementation of [`VendorApi`].
//!
//! One connection per request over hyper's HTTP/1 client, wrapped in
//! rustls when the base URL is `https`. Every request is bounded by the
//! configured timeout.
//!
//! ```text
//! POST /auth/login            {username, password}      → token
//! POST /auth/refresh          {user_id, refresh_token}  → token
//! GET  /devices               (bearer)                  → {devices: [...]}
//! GET  /devices/{id}/state                              → {power, mode, airflow}
//! PUT  /devices/{id}/power    {value: "on"}
//! PUT  /devices/{id}/mode     {value: "manual"}
//! PUT  /devices/{id}/airflow  {value: "<speed>"}
//! ```

use std::sync::Arc;
use std::time::Duration;

use aero_core::{
    Credentials, DeviceMode, FanSpeed, PowerState, VendorConfig, epoch_secs, truncate_chars,
};
use aerogrid_state::VendorSession;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::api::{DeviceState, VendorApi, VendorDevice};
use crate::error::{VendorError, VendorResult};

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    user_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    user_id: String,
    access_token: String,
    refresh_token: String,
    /// Seconds until the access token expires.
    expires_in: u64,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    devices: Vec<VendorDevice>,
}

#[derive(Deserialize)]
struct StateResponse {
    power: String,
    mode: String,
    airflow: String,
}

#[derive(Serialize)]
struct SetValue<'a> {
    value: &'a str,
}

impl TokenResponse {
    fn into_session(self, now: u64) -> VendorSession {
        VendorSession {
            user_id: self.user_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_expires_at: now.saturating_add(self.expires_in),
        }
    }
}

impl StateResponse {
    fn into_state(self) -> DeviceState {
        let power = if self.power.eq_ignore_ascii_case("on") {
            PowerState::On
        } else {
            PowerState::Off
        };
        let mode = if self.mode.eq_ignore_ascii_case("manual") {
            DeviceMode::Manual
        } else {
            DeviceMode::Auto
        };
        DeviceState {
            power,
            mode,
            airflow: self.airflow.to_ascii_lowercase().parse().ok(),
        }
    }
}

/// Vendor cloud client speaking JSON over HTTP/1.1.
#[derive(Clone)]
pub struct HttpVendorClient {
    base_url: String,
    timeout: Duration,
    tls: Arc<rustls::ClientConfig>,
}

impl HttpVendorClient {
    pub fn new(config: &VendorConfig) -> VendorResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e| VendorError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(uri.scheme_str(), Some("http") | Some("https")) || uri.host().is_none() {
            return Err(VendorError::InvalidUrl(format!(
                "{base_url}: expected an http:// or https:// url"
            )));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            tls: tls_config()?,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> VendorResult<T> {
        let bytes = self.send(method, path, bearer, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| VendorError::Decode(e.to_string()))
    }

    async fn command(&self, device_id: &str, attribute: &str, value: &str) -> VendorResult<()> {
        let path = format!("/devices/{}/{attribute}", encode_segment(device_id));
        let body = encode(&SetValue { value })?;
        self.send(Method::PUT, &path, None, Some(body)).await?;
        debug!(%device_id, attribute, value, "vendor command accepted");
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> VendorResult<Bytes> {
        let url = format!("{}{path}", self.base_url);
        let uri: Uri = url
            .parse()
            .map_err(|e| VendorError::InvalidUrl(format!("{url}: {e}")))?;

        match tokio::time::timeout(self.timeout, self.round_trip(method, uri, bearer, body)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%url, "vendor request timed out");
                Err(VendorError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn round_trip(
        &self,
        method: Method,
        uri: Uri,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> VendorResult<Bytes> {
        let host = uri
            .host()
            .ok_or_else(|| VendorError::InvalidUrl(uri.to_string()))?
            .to_string();
        let https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| host.clone());
        let target = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut builder = Request::builder()
            .method(method)
            .uri(target)
            .header(HOST, authority)
            .header(USER_AGENT, "aerogrid/0.1")
            .header(ACCEPT, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| VendorError::Transport(e.to_string()))?;

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| VendorError::Transport(format!("connect {host}:{port}: {e}")))?;

        let (status, bytes) = if https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| VendorError::Tls(e.to_string()))?;
            let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.tls));
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| VendorError::Tls(e.to_string()))?;
            exchange(stream, req).await?
        } else {
            exchange(tcp, req).await?
        };

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(VendorError::Status {
                status: status.as_u16(),
                body: truncate_chars(text.trim(), MAX_ERROR_BODY_CHARS),
            });
        }
        Ok(bytes)
    }
}

impl VendorApi for HttpVendorClient {
    async fn login(&self, credentials: &Credentials) -> VendorResult<VendorSession> {
        let body = encode(&LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        })?;
        let token: TokenResponse = self.call(Method::POST, "/auth/login", None, Some(body)).await?;
        debug!(user_id = %token.user_id, "vendor login succeeded");
        Ok(token.into_session(epoch_secs()))
    }

    async fn refresh(&self, session: &VendorSession) -> VendorResult<VendorSession> {
        let body = encode(&RefreshRequest {
            user_id: &session.user_id,
            refresh_token: &session.refresh_token,
        })?;
        let token: TokenResponse = self
            .call(Method::POST, "/auth/refresh", None, Some(body))
            .await?;
        debug!(user_id = %token.user_id, "vendor session refreshed");
        Ok(token.into_session(epoch_secs()))
    }

    async fn list_devices(&self, session: &VendorSession) -> VendorResult<Vec<VendorDevice>> {
        let list: DeviceListResponse = self
            .call(Method::GET, "/devices", Some(&session.access_token), None)
            .await?;
        Ok(list
            .devices
            .into_iter()
            .filter(|d| !d.device_id.trim().is_empty())
            .collect())
    }

    async fn get_state(&self, device_id: &str) -> VendorResult<DeviceState> {
        let path = format!("/devices/{}/state", encode_segment(device_id));
        let state: StateResponse = self.call(Method::GET, &path, None, None).await?;
        Ok(state.into_state())
    }

    async fn set_power_on(&self, device_id: &str) -> VendorResult<()> {
        self.command(device_id, "power", "on").await
    }

    async fn set_mode_manual(&self, device_id: &str) -> VendorResult<()> {
        self.command(device_id, "mode", "manual").await
    }

    async fn set_airflow(&self, device_id: &str, speed: FanSpeed) -> VendorResult<()> {
        self.command(device_id, "airflow", speed.as_str()).await
    }
}

/// Send one request over an established stream and collect the response.
async fn exchange<S>(io: S, req: Request<Full<Bytes>>) -> VendorResult<(StatusCode, Bytes)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| VendorError::Transport(format!("handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "vendor connection closed with error");
        }
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| VendorError::Transport(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| VendorError::Transport(e.to_string()))?
        .to_bytes();
    Ok((status, body))
}

fn tls_config() -> VendorResult<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| VendorError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

fn encode<T: Serialize>(value: &T) -> VendorResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| VendorError::Transport(format!("encode request: {e}")))
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> VendorConfig {
        VendorConfig {
            base_url: base_url.to_string(),
            timeout_secs: 2,
            ..VendorConfig::default()
        }
    }

    /// Serve exactly one request, returning what the client sent.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            HttpVendorClient::new(&config("ftp://vendor.example")),
            Err(VendorError::InvalidUrl(_))
        ));
        assert!(HttpVendorClient::new(&config("not a url")).is_err());
        assert!(HttpVendorClient::new(&config("https://vendor.example/v1/")).is_ok());
    }

    #[test]
    fn encode_segment_escapes_reserved_bytes() {
        assert_eq!(encode_segment("ABC_12-3.x~"), "ABC_12-3.x~");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn state_response_maps_loosely() {
        let state = StateResponse {
            power: "ON".to_string(),
            mode: "manual".to_string(),
            airflow: "Turbo".to_string(),
        }
        .into_state();
        assert_eq!(state.power, PowerState::On);
        assert_eq!(state.mode, DeviceMode::Manual);
        assert_eq!(state.airflow, Some(FanSpeed::Turbo));

        let state = StateResponse {
            power: "off".to_string(),
            mode: "auto".to_string(),
            airflow: "sleep".to_string(),
        }
        .into_state();
        assert_eq!(state.power, PowerState::Off);
        assert_eq!(state.mode, DeviceMode::Auto);
        assert_eq!(state.airflow, None);
    }

    #[test]
    fn token_expiry_is_relative_to_now() {
        let token = TokenResponse {
            user_id: "u1".to_string(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 3_600,
        };
        assert_eq!(token.into_session(1_000).access_expires_at, 4_600);
    }

    #[tokio::test]
    async fn login_posts_credentials() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"user_id":"u1","access_token":"a1","refresh_token":"r1","expires_in":3600}"#,
        )
        .await;
        let client = HttpVendorClient::new(&config(&base)).unwrap();

        let session = client
            .login(&Credentials {
                username: "user@example.com".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.access_token, "a1");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/login HTTP/1.1"));
        assert!(request.contains(r#""username":"user@example.com""#));
    }

    #[tokio::test]
    async fn list_devices_sends_bearer_token() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"devices":[{"device_id":"d1","alias":"Living Room"},{"device_id":""}]}"#,
        )
        .await;
        let client = HttpVendorClient::new(&config(&base)).unwrap();
        let session = VendorSession {
            user_id: "u1".to_string(),
            access_token: "tok".to_string(),
            refresh_token: "r".to_string(),
            access_expires_at: 0,
        };

        let devices = client.list_devices(&session).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "d1");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /devices HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"error":"expired"}"#).await;
        let client = HttpVendorClient::new(&config(&base)).unwrap();

        let err = client.set_airflow("d1", FanSpeed::High).await.unwrap_err();
        match err {
            VendorError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("expired"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /devices/d1/airflow HTTP/1.1"));
        assert!(request.contains(r#"{"value":"high"}"#));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpVendorClient::new(&config(&format!("http://{addr}"))).unwrap();
        let err = client.get_state("d1").await.unwrap_err();
        assert!(matches!(err, VendorError::Transport(_)));
    }
}
