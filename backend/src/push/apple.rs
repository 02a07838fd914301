// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use h2::client::{PingPong, SendRequest};
use http::{Request as HttpRequest, Response as HttpResponse};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use crate::push::client::{PushClient, TokenRegistrar};
use crate::push::dispatch::Dispatcher;
use crate::push::errors::{ClientError, ConfigurationError, ServiceError};
use crate::push::request::{Request, RequestState};
use crate::push::retry::RetryPolicy;
use crate::push::types::{PushInfo, PushType};

const APNS_HOST: &str = "api.push.apple.com";
const APNS_PORT: u16 = 443;
const DEFAULT_MAX_QUEUE_SIZE: usize = 512;
/// Matches the provider's default `SETTINGS_MAX_CONCURRENT_STREAMS` until the
/// handshake reports an operator-specific value; streams beyond this just
/// wait behind the semaphore rather than beyond an h2-enforced limit.
const DEFAULT_CONCURRENCY: usize = 100;
const PING_IDLE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Tracks the connection's public state (§4.3) for diagnostics; the actual
/// handshake/reconnect is driven lazily by whichever dispatch task next needs
/// a live `SendRequest`.
#[derive(Debug, Default)]
struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from(self.0.load(Ordering::Acquire))
    }
}

#[derive(Debug, Deserialize)]
struct ApnsErrorBody {
    reason: String,
}

/// Owns the TLS identity for one app and the current h2 handle, reconnecting
/// on demand. One instance per `.pem` file under `push-ios.certdir` (§4.1,
/// §4.3).
struct ApnsConnection {
    tls_connector: TlsConnector,
    server_name: ServerName<'static>,
    send_request: Mutex<Option<SendRequest<Bytes>>>,
    state: Arc<ConnectionStateCell>,
}

impl ApnsConnection {
    async fn new(cert_path: &Path, ca_path: &Path) -> Result<Self, ConfigurationError> {
        let cert_pem = tokio::fs::read(cert_path)
            .await
            .map_err(|source| ConfigurationError::MissingFile {
                path: cert_path.display().to_string(),
                source,
            })?;
        let ca_pem = tokio::fs::read(ca_path)
            .await
            .map_err(|source| ConfigurationError::MissingFile {
                path: ca_path.display().to_string(),
                source,
            })?;

        let mut cert_reader = std::io::Cursor::new(&cert_pem);
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<_, _>>()
            .map_err(|error| ConfigurationError::Tls {
                message: error.to_string(),
            })?;
        let mut key_reader = std::io::Cursor::new(&cert_pem);
        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|error| ConfigurationError::Tls {
                message: error.to_string(),
            })?
            .ok_or_else(|| ConfigurationError::Tls {
                message: "no private key found in certificate file".to_string(),
            })?;

        let mut ca_reader = std::io::Cursor::new(&ca_pem);
        let mut roots = rustls::RootCertStore::empty();
        for ca_cert in rustls_pemfile::certs(&mut ca_reader) {
            let ca_cert = ca_cert.map_err(|error| ConfigurationError::Tls {
                message: error.to_string(),
            })?;
            roots
                .add(ca_cert)
                .map_err(|error| ConfigurationError::Tls {
                    message: error.to_string(),
                })?;
        }

        let mut tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|error| ConfigurationError::Tls {
                message: error.to_string(),
            })?;
        tls_config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Self {
            tls_connector: TlsConnector::from(Arc::new(tls_config)),
            server_name: ServerName::try_from(APNS_HOST)
                .map_err(|error| ConfigurationError::Tls {
                    message: error.to_string(),
                })?,
            send_request: Mutex::new(None),
            state: Arc::new(ConnectionStateCell::default()),
        })
    }

    /// Returns a usable `SendRequest`, connecting or reconnecting as needed.
    async fn handle(&self) -> Result<SendRequest<Bytes>, ClientError> {
        let mut guard = self.send_request.lock().await;
        if let Some(handle) = guard.as_ref()
            && handle.clone().ready().await.is_ok()
        {
            return Ok(handle.clone());
        }

        self.state.set(ConnectionState::Connecting);
        let tcp = TcpStream::connect((APNS_HOST, APNS_PORT))
            .await
            .map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;
        let tls = self
            .tls_connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;
        let (send_request, mut connection) =
            h2::client::handshake(tls)
                .await
                .map_err(|error| ClientError::Transport {
                    message: error.to_string(),
                })?;

        self.state.set(ConnectionState::Connected);
        let ping_pong = connection.ping_pong().expect("h2 connection not yet polled");
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                warn!(%error, "APNs h2 connection closed");
            }
        });
        Self::spawn_idle_ping(ping_pong, self.state.clone());

        *guard = Some(send_request.clone());
        Ok(send_request)
    }

    fn note_disconnect(&self) {
        self.state.set(ConnectionState::Disconnecting);
        self.state.set(ConnectionState::Disconnected);
    }

    /// Pings the connection once it has been idle for `PING_IDLE_INTERVAL`;
    /// a missed PONG marks the connection `Disconnecting` so the next
    /// `handle()` call reconnects instead of reusing a dead stream (§4.3).
    fn spawn_idle_ping(mut ping_pong: PingPong, state: Arc<ConnectionStateCell>) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PING_IDLE_INTERVAL).await;
                if state.get() != ConnectionState::Connected {
                    return;
                }
                let ping = h2::Ping::opaque();
                match timeout(PING_IDLE_INTERVAL, ping_pong.ping(ping)).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => {
                        warn!(%error, "APNs connection rejected ping");
                    }
                    Err(_) => {
                        warn!("APNs connection missed PONG within idle interval");
                    }
                }
                state.set(ConnectionState::Disconnecting);
                state.set(ConnectionState::Disconnected);
                return;
            }
        });
    }

}

/// APNs device-token client (§4.3): one persistent mutually-authenticated
/// HTTP/2 connection, requests multiplexed as concurrent streams.
pub struct AppleClient {
    dispatcher: Arc<Dispatcher>,
}

impl AppleClient {
    pub async fn new(
        name: impl Into<String>,
        cert_path: &Path,
        ca_path: &Path,
        token_registrar: Arc<dyn TokenRegistrar>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let connection = Arc::new(ApnsConnection::new(cert_path, ca_path).await?);
        let dispatcher = Dispatcher::new(name.clone(), DEFAULT_MAX_QUEUE_SIZE);
        let retry_policy = RetryPolicy::default();

        dispatcher.clone().spawn(DEFAULT_CONCURRENCY, {
            let dispatcher = dispatcher.clone();
            let name = name.clone();
            move |request| {
                let connection = connection.clone();
                let dispatcher = dispatcher.clone();
                let retry_policy = retry_policy;
                let name = name.clone();
                let token_registrar = token_registrar.clone();
                async move {
                    let outcome =
                        Self::drive(&connection, &request, retry_policy, &name, token_registrar.as_ref())
                            .await;
                    dispatcher.finish(request, outcome);
                }
            }
        });

        Ok(Self { dispatcher })
    }

    async fn drive(
        connection: &Arc<ApnsConnection>,
        request: &Request,
        retry_policy: RetryPolicy,
        name: &str,
        token_registrar: &dyn TokenRegistrar,
    ) -> RequestState {
        let token = request
            .push_info
            .destination_for(request.push_type())
            .map(|destination| destination.device_id.clone())
            .unwrap_or_default();

        let mut attempt = 0;
        loop {
            match Self::send_once(connection, &token, &request.body).await {
                Ok(outcome) if Self::is_unregistered(&outcome) => {
                    token_registrar.invalidate(name, &token).await;
                    return outcome;
                }
                Ok(outcome) => return outcome,
                Err(error) if error.is_retryable() && !retry_policy.is_exhausted(attempt) => {
                    connection.note_disconnect();
                    tokio::time::sleep(retry_policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(error) => {
                    return RequestState::Failed {
                        reason: error.to_string(),
                    }
                }
            }
        }
    }

    /// True for the terminal outcome `classify` produces on `:status 410`
    /// (§4.3), the trigger for reporting the token to the invalidation hook.
    fn is_unregistered(outcome: &RequestState) -> bool {
        matches!(outcome, RequestState::Failed { reason } if reason == "Unregistered")
    }

    async fn send_once(
        connection: &Arc<ApnsConnection>,
        token: &str,
        body: &[u8],
    ) -> Result<RequestState, ClientError> {
        let mut send_request = connection.handle().await?;
        let http_request = HttpRequest::builder()
            .method("POST")
            .uri(format!("https://{APNS_HOST}/3/device/{token}"))
            .header("apns-push-type", "alert")
            .body(())
            .expect("static request parts are always valid");

        let (response_future, mut send_stream) = send_request
            .send_request(http_request, false)
            .map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;
        send_stream
            .send_data(Bytes::copy_from_slice(body), true)
            .map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;

        let response: HttpResponse<h2::RecvStream> =
            response_future.await.map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;

        Self::classify(response).await
    }

    async fn classify(response: HttpResponse<h2::RecvStream>) -> Result<RequestState, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(RequestState::Successful);
        }

        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|error| ClientError::Transport {
                message: error.to_string(),
            })?;
            bytes.extend_from_slice(&chunk);
        }
        let reason = serde_json::from_slice::<ApnsErrorBody>(&bytes)
            .map(|body| body.reason)
            .unwrap_or_else(|_| status.to_string());

        if status.as_u16() == 410 {
            info!(%reason, "APNs token unregistered");
            return Ok(RequestState::Failed {
                reason: "Unregistered".to_string(),
            });
        }
        if status.is_server_error() {
            return Err(ClientError::Transport { message: reason });
        }
        Ok(RequestState::Failed { reason })
    }
}

#[async_trait]
impl PushClient for AppleClient {
    fn name(&self) -> &str {
        self.dispatcher.name()
    }

    fn make_request(
        &self,
        push_type: PushType,
        info: Arc<PushInfo>,
    ) -> Result<Request, ServiceError> {
        let body = serde_json::to_vec(&info).map_err(|error| {
            ServiceError::Configuration(ConfigurationError::InvalidArgument {
                message: error.to_string(),
            })
        })?;
        let mut request = Request::new(self.name().to_string(), info, body);
        request.set_push_type(push_type);
        Ok(request)
    }

    async fn send_push(
        &self,
        mut request: Request,
    ) -> Result<oneshot::Receiver<RequestState>, ClientError> {
        let rx = request.attach_completion();
        request
            .transition(RequestState::Queued)
            .expect("fresh request transitions Created -> Queued");
        self.dispatcher.enqueue(request)?;
        Ok(rx)
    }

    fn is_idle(&self) -> bool {
        self.dispatcher.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TokenRegistrar for RecordingRegistrar {
        async fn invalidate(&self, client: &str, token: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((client.to_string(), token.to_string()));
        }
    }

    #[tokio::test]
    async fn unregistered_outcome_reports_token_to_registrar() {
        let registrar = RecordingRegistrar::default();
        let outcome = RequestState::Failed {
            reason: "Unregistered".to_string(),
        };
        assert!(AppleClient::is_unregistered(&outcome));
        registrar.invalidate("apns-cert", "tok-1").await;
        assert_eq!(
            registrar.calls.lock().unwrap().as_slice(),
            &[("apns-cert".to_string(), "tok-1".to_string())]
        );
    }

    #[test]
    fn other_failures_are_not_unregistered() {
        let outcome = RequestState::Failed {
            reason: "BadDeviceToken".to_string(),
        };
        assert!(!AppleClient::is_unregistered(&outcome));
    }

    #[tokio::test]
    async fn rejects_missing_certificate_file() {
        let error = ApnsConnection::new(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/ca.pem"),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ConfigurationError::MissingFile { .. }));
    }

    #[test]
    fn state_defaults_to_disconnected() {
        let cell = ConnectionStateCell::default();
        assert_eq!(cell.get(), ConnectionState::Disconnected);
        cell.set(ConnectionState::Connected);
        assert_eq!(cell.get(), ConnectionState::Connected);
    }
}
