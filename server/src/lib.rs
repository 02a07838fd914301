// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process entry point wiring the push dispatch and conference address
//! allocation core to configuration, logging and metrics.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sipcore::push::{
    Destination, PayloadCategory, PushInfo, PushService, PushType, RequestState, TokenRegistrar,
};
use tracing::{info, warn};

pub mod args;
pub mod configurations;
pub mod logging;
pub mod metrics;
pub mod settings;

use settings::Settings;

/// Default [`TokenRegistrar`]: the concrete registration store an
/// unregistered device token should be flagged against lives outside this
/// crate (§1 Non-goals — registrar storage); this logs the invalidation so
/// an operator can wire a real upstream hook in front of it.
struct LoggingTokenRegistrar;

#[async_trait]
impl TokenRegistrar for LoggingTokenRegistrar {
    async fn invalidate(&self, client: &str, token: &str) {
        warn!(client, token, "device token unregistered, flagged for upstream invalidation");
    }
}

/// Builds a [`PushService`] from `settings`, registering whichever of the
/// generic/APNs/Firebase client families are configured (§4.1).
pub async fn build_push_service(settings: &Settings) -> anyhow::Result<PushService> {
    let service = PushService::new();

    if let Some(generic) = &settings.generic_client {
        service.setup_generic_client(
            generic.url.clone(),
            generic.method.into(),
            generic.protocol.into(),
        )?;
    }

    if let Some(ios) = &settings.push_ios {
        service
            .setup_ios_clients(
                Path::new(&ios.certdir),
                Path::new(&ios.cafile),
                Arc::new(LoggingTokenRegistrar),
            )
            .await?;
    }

    if !settings.firebase.projects_api_keys.is_empty() || !settings.firebase.service_accounts.is_empty() {
        let firebase = &settings.firebase;
        service
            .setup_firebase_clients(sipcore::push::FirebaseConfig {
                projects_api_keys: firebase
                    .projects_api_keys
                    .iter()
                    .map(|pair| (pair.app_id.clone(), pair.value.clone()))
                    .collect(),
                service_accounts: firebase
                    .service_accounts
                    .iter()
                    .map(|pair| (pair.app_id.clone(), pair.value.clone()))
                    .collect(),
                default_refresh_interval: firebase.default_refresh_interval,
                token_expiration_anticipation: firebase.token_expiration_anticipation_time,
                token_helper_path: firebase
                    .token_helper_path
                    .clone()
                    .unwrap_or_else(|| "fcm-token-helper".to_string()),
            })
            .await?;
    }

    Ok(service)
}

/// Runs the process: brings up the push service and the metrics endpoint,
/// then waits for a shutdown signal. The enclosing SIP proxy message router
/// that would otherwise feed requests into this service is out of scope
/// (§1); this keeps the process alive as a standalone dispatcher.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let service = build_push_service(&settings).await?;
    metrics::serve_metrics(settings.application.listen_metrics).await?;

    info!("push dispatch core ready");
    tokio::signal::ctrl_c().await?;
    info!(idle = service.is_idle(), "shutting down");
    Ok(())
}

/// Dispatches one notification end-to-end and waits for its terminal state,
/// for the `test-push` CLI command.
pub async fn send_test_push(
    settings: &Settings,
    app_id: &str,
    token: &str,
    provider: &str,
) -> anyhow::Result<RequestState> {
    let service = build_push_service(settings).await?;

    let info = PushInfo::builder(app_id, PayloadCategory::Message)
        .destination(PushType::Message, Destination::new(token, provider))
        .build()?;

    let request = service.make_request(PushType::Message, info)?;
    let receiver = service.send_push(request).await?;
    Ok(receiver.await?)
}
