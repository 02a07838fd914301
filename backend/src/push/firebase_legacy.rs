// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::push::client::PushClient;
use crate::push::dispatch::Dispatcher;
use crate::push::errors::{ClientError, ServiceError};
use crate::push::request::{Request, RequestState};
use crate::push::types::{PushInfo, PushType};

const LEGACY_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";
const DEFAULT_MAX_QUEUE_SIZE: usize = 256;
/// HTTP/1.1, single connection, no pipelining (§4.4).
const LEGACY_CONCURRENCY: usize = 1;

#[derive(Debug, Serialize)]
struct LegacyBody<'a> {
    to: &'a str,
    data: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LegacyResponse {
    failure: u64,
    results: Option<Vec<LegacyResult>>,
}

#[derive(Debug, Deserialize)]
struct LegacyResult {
    error: Option<String>,
}

/// FCM legacy HTTP endpoint client: a static API key attached per request,
/// no token rotation (§4.4).
pub struct FirebaseLegacyClient {
    dispatcher: Arc<Dispatcher>,
}

impl FirebaseLegacyClient {
    pub fn new(app_id: impl Into<String>, api_key: String) -> Self {
        let app_id = app_id.into();
        let http = HttpClient::builder()
            .http1_only()
            .pool_max_idle_per_host(1)
            .build()
            .expect("reqwest client with static config always builds");

        let dispatcher = Dispatcher::new(app_id, DEFAULT_MAX_QUEUE_SIZE);
        dispatcher.clone().spawn(LEGACY_CONCURRENCY, {
            let dispatcher = dispatcher.clone();
            let api_key = api_key.clone();
            move |request| {
                let http = http.clone();
                let dispatcher = dispatcher.clone();
                let api_key = api_key.clone();
                async move {
                    let outcome = Self::send_once(&http, &api_key, &request).await;
                    dispatcher.finish(request, outcome);
                }
            }
        });

        Self { dispatcher }
    }

    async fn send_once(http: &HttpClient, api_key: &str, request: &Request) -> RequestState {
        let result = http
            .post(LEGACY_ENDPOINT)
            .header("Authorization", format!("key={api_key}"))
            .header("Content-Type", "application/json")
            .body(request.body.clone())
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                return RequestState::Failed {
                    reason: error.to_string(),
                }
            }
        };

        if !response.status().is_success() {
            return RequestState::Failed {
                reason: format!("status {}", response.status()),
            };
        }

        let body: LegacyResponse = match response.json().await {
            Ok(body) => body,
            Err(error) => {
                return RequestState::Failed {
                    reason: error.to_string(),
                }
            }
        };

        if body.failure == 0 {
            return RequestState::Successful;
        }

        let reason = body
            .results
            .and_then(|results| results.into_iter().find_map(|r| r.error))
            .unwrap_or_else(|| "unknown FCM legacy failure".to_string());
        RequestState::Failed { reason }
    }
}

#[async_trait]
impl PushClient for FirebaseLegacyClient {
    fn name(&self) -> &str {
        self.dispatcher.name()
    }

    fn make_request(
        &self,
        push_type: PushType,
        info: Arc<PushInfo>,
    ) -> Result<Request, ServiceError> {
        let destination = info.destination_for(push_type);
        let data = serde_json::json!({
            "category": format!("{:?}", info.payload_category),
            "caller": info.caller_name,
            "badge": info.badge,
            "custom": info.custom,
        });
        let body = serde_json::to_vec(&LegacyBody {
            to: destination.map(|d| d.device_id.as_str()).unwrap_or_default(),
            data: &data,
        })
        .expect("legacy body serializes");

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
