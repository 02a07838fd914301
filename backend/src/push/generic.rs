// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client as HttpClient;
use tokio::sync::oneshot;
use tracing::warn;

use crate::push::client::PushClient;
use crate::push::dispatch::Dispatcher;
use crate::push::errors::{ClientError, ConfigurationError, ServiceError};
use crate::push::request::{Request, RequestState};
use crate::push::types::{PushInfo, PushType};

const DEFAULT_MAX_QUEUE_SIZE: usize = 256;
/// Generic clients proxy to a single operator endpoint; keep requests
/// strictly ordered the way an HTTP/1.1 transport would.
const GENERIC_CONCURRENCY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProtocol {
    Http,
    Http2,
}

/// Operator-configured transport for sites that proxy notifications through
/// their own service (§4.7). Delegates native-request construction to
/// whichever provider-specific client is registered under the provider tag,
/// via a *weak* lookup into the service registry (relation, not ownership,
/// per §9's design note).
pub struct GenericHttpClient {
    dispatcher: Arc<Dispatcher>,
    url_template: String,
    method: HttpMethod,
    registry: Weak<DashMap<String, Arc<dyn PushClient>>>,
}

impl GenericHttpClient {
    pub fn new(
        name: impl Into<String>,
        url_template: String,
        method: HttpMethod,
        protocol: HttpProtocol,
        registry: Weak<DashMap<String, Arc<dyn PushClient>>>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = HttpClient::builder();
        builder = match protocol {
            HttpProtocol::Http => builder.http1_only(),
            HttpProtocol::Http2 => builder.http2_prior_knowledge(),
        };
        let http = builder
            .build()
            .map_err(|error| ConfigurationError::InvalidArgument {
                message: error.to_string(),
            })?;

        let dispatcher = Dispatcher::new(name, DEFAULT_MAX_QUEUE_SIZE);
        let method_copy = method;
        dispatcher.clone().spawn(GENERIC_CONCURRENCY, {
            let dispatcher = dispatcher.clone();
            move |request| {
                let http = http.clone();
                let dispatcher = dispatcher.clone();
                async move {
                    let url = Self::expand(
                        &request.body_url_placeholder(),
                        &request.push_info,
                        request.push_type(),
                    );
                    let builder = match method_copy {
                        HttpMethod::Get => http.get(&url),
                        HttpMethod::Post => http.post(&url).body(request.body.clone()),
                    };
                    let outcome = match builder.send().await {
                        Ok(response) if response.status().is_success() => RequestState::Successful,
                        Ok(response) => RequestState::Failed {
                            reason: format!("status {}", response.status()),
                        },
                        Err(error) => {
                            warn!(%error, "generic client transport error");
                            RequestState::Failed {
                                reason: error.to_string(),
                            }
                        }
                    };
                    dispatcher.finish(request, outcome);
                }
            }
        });

        Ok(Self {
            dispatcher,
            url_template,
            method,
            registry,
        })
    }

    fn expand(template: &str, info: &PushInfo, push_type: PushType) -> String {
        let destination = info.destination_for(push_type);
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '{' {
                out.push(c);
                continue;
            }
            let mut var = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var.push(c);
            }
            let value = match var.as_str() {
                "app-id" => info.app_id.clone(),
                "provider" => destination.map(|d| d.provider.clone()).unwrap_or_default(),
                "token" => destination.map(|d| d.device_id.clone()).unwrap_or_default(),
                "caller" => info.caller_name.clone().unwrap_or_default(),
                "event-id" => info.event_id.clone().unwrap_or_default(),
                other => info.custom.get(other).cloned().unwrap_or_default(),
            };
            out.push_str(&value);
        }
        out
    }

    /// Looks up a sibling client by provider tag to let it construct the
    /// native per-provider body, so site code may reference per-provider
    /// payloads (§4.7).
    fn sibling_body(&self, push_type: PushType, info: &Arc<PushInfo>) -> Option<Vec<u8>> {
        let registry = self.registry.upgrade()?;
        let provider = info.destination_for(push_type)?.provider.clone();
        let sibling = registry.get(&provider)?.value().clone();
        sibling
            .make_request(push_type, info.clone())
            .ok()
            .map(|r| r.body)
    }
}

#[async_trait]
impl PushClient for GenericHttpClient {
    fn name(&self) -> &str {
        self.dispatcher.name()
    }

    fn make_request(
        &self,
        push_type: PushType,
        info: Arc<PushInfo>,
    ) -> Result<Request, ServiceError> {
        let body = match self.method {
            HttpMethod::Get => Vec::new(),
            HttpMethod::Post => self.sibling_body(push_type, &info).unwrap_or_default(),
        };
        let mut request = Request::new(self.name().to_string(), info, body);
        request.set_push_type(push_type);
        request.set_url_template(self.url_template.clone());
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
    use crate::push::types::{Destination, PayloadCategory};

    #[test]
    fn expands_known_variables() {
        let info = PushInfo::builder("app1", PayloadCategory::Message)
            .destination(PushType::Message, Destination::new("tok-1", "apns"))
            .build()
            .unwrap();
        let expanded = GenericHttpClient::expand(
            "https://example.com/push?app={app-id}&token={token}",
            &info,
            PushType::Message,
        );
        assert_eq!(expanded, "https://example.com/push?app=app1&token=tok-1");
    }
}
