// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::push::client::PushClient;
use crate::push::dispatch::Dispatcher;
use crate::push::errors::{ClientError, ServiceError};
use crate::push::request::{Request, RequestState};
use crate::push::token_manager::TokenManager;
use crate::push::types::{PushInfo, PushType};

fn v1_endpoint(project_id: &str) -> String {
    format!("https://fcm.googleapis.com/v1/projects/{project_id}/messages:send")
}

const DEFAULT_MAX_QUEUE_SIZE: usize = 256;
/// HTTP/2 multiplexes; bounded generously since flow control is h2's job.
const V1_CONCURRENCY: usize = 32;
/// Time a request will suspend waiting for a fresh token before failing with
/// `TokenUnavailable` (§4.5).
const TOKEN_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct V1Envelope<'a> {
    message: V1Message<'a>,
}

#[derive(Debug, Serialize)]
struct V1Message<'a> {
    token: &'a str,
    notification: V1Notification<'a>,
    data: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct V1Notification<'a> {
    title: Option<&'a str>,
}

/// FCM v1 client: one instance per service account, bearer token supplied by
/// the owning [`TokenManager`] (§4.5).
pub struct FirebaseV1Client {
    dispatcher: Arc<Dispatcher>,
}

impl FirebaseV1Client {
    pub fn new(app_id: impl Into<String>, token_manager: Arc<TokenManager>) -> Self {
        let app_id = app_id.into();
        let http = HttpClient::builder()
            .http2_prior_knowledge()
            .build()
            .expect("reqwest client with static config always builds");

        let dispatcher = Dispatcher::new(app_id.clone(), DEFAULT_MAX_QUEUE_SIZE);
        dispatcher.clone().spawn(V1_CONCURRENCY, {
            let dispatcher = dispatcher.clone();
            let app_id = app_id.clone();
            move |request| {
                let http = http.clone();
                let dispatcher = dispatcher.clone();
                let token_manager = token_manager.clone();
                let app_id = app_id.clone();
                async move {
                    let outcome = Self::send_once(&http, &app_id, &token_manager, &request).await;
                    dispatcher.finish(request, outcome);
                }
            }
        });

        Self { dispatcher }
    }

    async fn send_once(
        http: &HttpClient,
        project_id: &str,
        token_manager: &TokenManager,
        request: &Request,
    ) -> RequestState {
        let token = match tokio::time::timeout(TOKEN_WAIT_TIMEOUT, token_manager.current_token())
            .await
        {
            Ok(Ok(token)) => token,
            Ok(Err(error)) => {
                return RequestState::Failed {
                    reason: error.to_string(),
                }
            }
            Err(_) => {
                return RequestState::Failed {
                    reason: ClientError::TokenUnavailable.to_string(),
                }
            }
        };

        let result = http
            .post(v1_endpoint(project_id))
            .bearer_auth(&token.token)
            .header("Content-Type", "application/json")
            .body(request.body.clone())
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => RequestState::Successful,
            Ok(response) => RequestState::Failed {
                reason: format!("status {}", response.status()),
            },
            Err(error) => RequestState::Failed {
                reason: error.to_string(),
            },
        }
    }
}

#[async_trait]
impl PushClient for FirebaseV1Client {
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
            "custom": info.custom,
            "eventId": info.event_id,
        });
        let body = serde_json::to_vec(&V1Envelope {
            message: V1Message {
                token: destination.map(|d| d.device_id.as_str()).unwrap_or_default(),
                notification: V1Notification {
                    title: info.caller_name.as_deref(),
                },
                data: &data,
            },
        })
        .expect("v1 envelope serializes");

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
