// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::push::apple::AppleClient;
use crate::push::client::{PushClient, TokenRegistrar};
use crate::push::errors::{ConfigurationError, ServiceError};
use crate::push::firebase_legacy::FirebaseLegacyClient;
use crate::push::firebase_v1::FirebaseV1Client;
use crate::push::generic::{GenericHttpClient, HttpMethod, HttpProtocol};
use crate::push::request::{Request, RequestState};
use crate::push::token_manager::TokenManager;
use crate::push::types::{PushInfo, PushType};

pub const GENERIC_CLIENT_NAME: &str = "generic";
pub const FALLBACK_CLIENT_NAME: &str = "fallback";

/// Configuration for the Firebase family of clients (§4.1, §6).
#[derive(Debug, Clone, Default)]
pub struct FirebaseConfig {
    /// `appId:apiKey` pairs, one legacy client each.
    pub projects_api_keys: Vec<(String, String)>,
    /// `appId:servicePath` pairs, one v1 client (and `TokenManager`) each.
    pub service_accounts: Vec<(String, String)>,
    pub default_refresh_interval: std::time::Duration,
    pub token_expiration_anticipation: std::time::Duration,
    /// Path to the out-of-process OAuth2 token refresh helper (§4.6, §6).
    pub token_helper_path: String,
}

/// Registry of per-provider clients and dispatch entry point (§4.1).
#[derive(Clone, Default)]
pub struct PushService {
    clients: Arc<DashMap<String, Arc<dyn PushClient>>>,
}

impl PushService {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn PushClient>> {
        self.clients.get(name).map(|entry| entry.value().clone())
    }

    fn insert(&self, name: String, client: Arc<dyn PushClient>) {
        self.clients.insert(name, client);
    }

    /// Builds a `Request` for `push_type`/`info` following the resolution
    /// order in §4.1:
    /// 1. the `"generic"` client, if registered;
    /// 2. the client named after the destination's provider tag;
    /// 3. the `"fallback"` client, if registered;
    /// 4. otherwise `UnsupportedProvider`.
    pub fn make_request(
        &self,
        push_type: PushType,
        info: PushInfo,
    ) -> Result<Request, ServiceError> {
        let info = Arc::new(info);

        if let Some(generic) = self.get(GENERIC_CLIENT_NAME) {
            return generic.make_request(push_type, info).map_err(Into::into);
        }

        let provider = info
            .destination_for(push_type)
            .map(|destination| destination.provider.clone());

        if let Some(provider) = provider
            && let Some(client) = self.get(&provider)
        {
            return client.make_request(push_type, info).map_err(Into::into);
        }

        if let Some(fallback) = self.get(FALLBACK_CLIENT_NAME) {
            return fallback.make_request(push_type, info).map_err(Into::into);
        }

        Err(ServiceError::UnsupportedProvider)
    }

    /// Routes `request` to the client named `request.app_identifier`,
    /// falling back to `"fallback"` (§4.1). Enqueues without blocking until
    /// completion.
    pub async fn send_push(
        &self,
        request: Request,
    ) -> Result<oneshot::Receiver<RequestState>, ServiceError> {
        let client = self
            .get(&request.app_identifier)
            .or_else(|| self.get(FALLBACK_CLIENT_NAME))
            .ok_or(ServiceError::NoClientAvailable)?;
        client.send_push(request).await.map_err(Into::into)
    }

    pub fn is_idle(&self) -> bool {
        self.clients.iter().all(|entry| entry.value().is_idle())
    }

    pub fn setup_generic_client(
        &self,
        url: String,
        method: HttpMethod,
        protocol: HttpProtocol,
    ) -> Result<(), ConfigurationError> {
        let client = GenericHttpClient::new(
            GENERIC_CLIENT_NAME,
            url,
            method,
            protocol,
            Arc::downgrade(&self.clients),
        )?;
        self.insert(GENERIC_CLIENT_NAME.to_string(), Arc::new(client));
        Ok(())
    }

    /// Scans `cert_dir` non-recursively for `*.pem` files; each becomes an
    /// `AppleClient` keyed by the filename minus suffix. A TLS-construction
    /// failure for one certificate is logged and skipped (§4.1).
    pub async fn setup_ios_clients(
        &self,
        cert_dir: &Path,
        ca_file: &Path,
        token_registrar: Arc<dyn TokenRegistrar>,
    ) -> Result<(), ConfigurationError> {
        let mut entries = tokio::fs::read_dir(cert_dir).await.map_err(|source| {
            ConfigurationError::MissingFile {
                path: cert_dir.display().to_string(),
                source,
            }
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| {
            ConfigurationError::MissingFile {
                path: cert_dir.display().to_string(),
                source,
            }
        })? {
            let path = entry.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".pem"))
            else {
                continue;
            };

            match AppleClient::new(name, &path, ca_file, token_registrar.clone()).await {
                Ok(client) => self.insert(name.to_string(), Arc::new(client)),
                Err(error) => warn!(cert = name, %error, "skipping APNs certificate"),
            }
        }

        Ok(())
    }

    /// It is an error (`DuplicateAppId`) if the same `appId` appears in both
    /// the legacy and v1 sets (§4.1).
    pub async fn setup_firebase_clients(
        &self,
        config: FirebaseConfig,
    ) -> Result<(), ConfigurationError> {
        let legacy_ids: std::collections::HashSet<_> = config
            .projects_api_keys
            .iter()
            .map(|(app_id, _)| app_id.clone())
            .collect();
        for (app_id, _) in &config.service_accounts {
            if legacy_ids.contains(app_id) {
                return Err(ConfigurationError::DuplicateAppId {
                    app_id: app_id.clone(),
                });
            }
        }

        for (app_id, api_key) in &config.projects_api_keys {
            let client = FirebaseLegacyClient::new(app_id, api_key.clone());
            self.insert(app_id.clone(), Arc::new(client));
        }

        for (app_id, path) in &config.service_accounts {
            let token_manager = TokenManager::new(
                app_id,
                path,
                config.token_helper_path.clone(),
                config.default_refresh_interval,
                config.token_expiration_anticipation,
            )
            .await
            .map_err(|error| ConfigurationError::MissingFile {
                path: path.clone(),
                source: std::io::Error::other(error.to_string()),
            })?;
            let client = FirebaseV1Client::new(app_id, Arc::new(token_manager));
            self.insert(app_id.clone(), Arc::new(client));
        }

        info!(
            legacy = config.projects_api_keys.len(),
            v1 = config.service_accounts.len(),
            "configured Firebase clients"
        );
        Ok(())
    }

    pub fn set_fallback_client(&self, client: Arc<dyn PushClient>) {
        self.insert(FALLBACK_CLIENT_NAME.to_string(), client);
    }
}
