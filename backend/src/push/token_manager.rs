// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::push::errors::TokenManagerError;
use crate::push::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
struct HelperOutput {
    access_token: String,
    expires_in: u64,
}

/// A bearer string with an absolute expiration (§3).
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Instant,
}

impl AccessToken {
    fn usable(&self, anticipation: Duration) -> bool {
        Instant::now() + anticipation < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagerState {
    Uninitialized,
    Refreshing,
    Ready,
    Failed,
}

/// One instance per FCM v1 service account (§4.6). Refreshes are single-
/// flight: concurrent callers coalesce onto the same pending refresh via the
/// `refreshing` mutex, and the resulting token is broadcast to every waiter.
pub struct TokenManager {
    app_id: String,
    service_account_path: String,
    helper_path: String,
    min_refresh_interval: Duration,
    anticipation: Duration,
    current: Mutex<Option<AccessToken>>,
    state: Mutex<ManagerState>,
    last_refresh: Mutex<Option<Instant>>,
    publish: broadcast::Sender<AccessToken>,
    retry_policy: RetryPolicy,
}

impl TokenManager {
    pub async fn new(
        app_id: impl Into<String>,
        service_account_path: impl Into<String>,
        helper_path: String,
        min_refresh_interval: Duration,
        anticipation: Duration,
    ) -> Result<Self, TokenManagerError> {
        let service_account_path = service_account_path.into();
        // Validated eagerly: a missing or unreadable file is the only
        // terminal failure this manager ever reports (§4.6).
        tokio::fs::metadata(&service_account_path).await?;

        let (publish, _) = broadcast::channel(16);
        Ok(Self {
            app_id: app_id.into(),
            service_account_path,
            helper_path,
            min_refresh_interval,
            anticipation,
            current: Mutex::new(None),
            state: Mutex::new(ManagerState::Uninitialized),
            last_refresh: Mutex::new(None),
            publish,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns a token usable right now, refreshing (or waiting on an
    /// in-flight refresh) if the current one is stale or absent. Honours the
    /// `defaultRefreshInterval` floor between helper invocations (§4.6).
    pub async fn current_token(&self) -> Result<AccessToken, TokenManagerError> {
        if let Some(token) = self.current.lock().await.clone()
            && token.usable(self.anticipation)
        {
            return Ok(token);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<AccessToken, TokenManagerError> {
        let mut subscriber = self.publish.subscribe();
        let mut state = self.state.lock().await;
        if *state == ManagerState::Refreshing {
            drop(state);
            return subscriber
                .recv()
                .await
                .map_err(|error| TokenManagerError::TokenRefreshFailed {
                    message: error.to_string(),
                });
        }

        if let Some(last) = *self.last_refresh.lock().await
            && last.elapsed() < self.min_refresh_interval
            && let Some(token) = self.current.lock().await.clone()
        {
            return Ok(token);
        }

        *state = ManagerState::Refreshing;
        drop(state);

        let result = self.invoke_helper_with_backoff().await;
        *self.last_refresh.lock().await = Some(Instant::now());

        let mut state = self.state.lock().await;
        match &result {
            Ok(token) => {
                *state = ManagerState::Ready;
                *self.current.lock().await = Some(token.clone());
                let _ = self.publish.send(token.clone());
                info!(app_id = %self.app_id, "refreshed FCM v1 token");
            }
            Err(_) => {
                *state = if self.current.lock().await.is_some() {
                    ManagerState::Ready
                } else {
                    ManagerState::Failed
                };
            }
        }
        result
    }

    async fn invoke_helper_with_backoff(&self) -> Result<AccessToken, TokenManagerError> {
        let mut attempt = 0;
        loop {
            match self.invoke_helper().await {
                Ok(token) => return Ok(token),
                Err(error) if !self.retry_policy.is_exhausted(attempt) => {
                    warn!(app_id = %self.app_id, %error, attempt, "token refresh failed, retrying");
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn invoke_helper(&self) -> Result<AccessToken, TokenManagerError> {
        let output = Command::new(&self.helper_path)
            .arg(&self.service_account_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| TokenManagerError::TokenRefreshFailed {
                message: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(TokenManagerError::TokenRefreshFailed {
                message: format!(
                    "helper exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let parsed: HelperOutput = serde_json::from_slice(&output.stdout)?;
        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_unusable_once_within_anticipation_window() {
        let token = AccessToken {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(5),
        };
        assert!(!token.usable(Duration::from_secs(10)));
        assert!(token.usable(Duration::from_millis(1)));
    }
}
