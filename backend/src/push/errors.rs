// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use displaydoc::Display;

/// Setup-time failures, surfaced at process init (§7: ConfigurationError).
#[derive(Debug, Display, thiserror::Error)]
pub enum ConfigurationError {
    /// app id `{app_id}` is registered as both a legacy and a v1 FCM client
    DuplicateAppId { app_id: String },
    /// invalid argument: {message}
    InvalidArgument { message: String },
    /// failed to read `{path}`
    MissingFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TLS setup failed: {message}
    Tls { message: String },
}

/// Per-request client-layer failures (§7: TransportError / ProviderRejection
/// / QueueFull / TokenUnavailable).
#[derive(Debug, Display, thiserror::Error, Clone)]
pub enum ClientError {
    /// transport error: {message}
    Transport { message: String },
    /// provider rejected the request: {reason}
    ProviderRejection { reason: String },
    /// client queue is full
    QueueFull,
    /// no usable FCM v1 token is available
    TokenUnavailable,
}

impl ClientError {
    /// Transport-level failures and 429s are retried; provider rejections,
    /// full queues and unavailable tokens are terminal (§4.2, §7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}

/// Service-level routing failures (§7, §4.1).
#[derive(Debug, Display, thiserror::Error)]
pub enum ServiceError {
    /// no client is registered for this provider, and no fallback is configured
    UnsupportedProvider,
    /// no client is registered for this app, and no fallback is configured
    NoClientAvailable,
    /// {0}
    Configuration(#[from] ConfigurationError),
    /// {0}
    Client(#[from] ClientError),
}

/// TokenManager failures (§4.6, §6 subprocess protocol).
#[derive(Debug, Display, thiserror::Error)]
pub enum TokenManagerError {
    /// failed to load service account file: {0}
    FileLoad(#[from] std::io::Error),
    /// malformed service account JSON: {0}
    Json(#[from] serde_json::Error),
    /// token refresh helper failed: {message}
    TokenRefreshFailed { message: String },
}
