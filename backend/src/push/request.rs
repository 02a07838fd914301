// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use displaydoc::Display;
use tokio::sync::oneshot;

use crate::push::types::{PushInfo, PushType};

/// `Request` states, monotonic per §8 invariant 2:
/// `Created -> Queued -> InProgress -> {Successful, Failed}`.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Created,
    Queued,
    InProgress,
    Successful,
    Failed { reason: String },
}

impl RequestState {
    fn rank(&self) -> u8 {
        match self {
            RequestState::Created => 0,
            RequestState::Queued => 1,
            RequestState::InProgress => 2,
            RequestState::Successful | RequestState::Failed { .. } => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }
}

/// Attempted to move a [`Request`] backward, or out of a terminal state.
#[derive(Debug, Display, thiserror::Error)]
#[displaydoc("illegal request transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: RequestState,
    pub to: RequestState,
}

/// A unit of delivery work (§3). Owned by the producer until enqueued via
/// [`crate::push::client::PushClient::send_push`], exclusively by its client
/// from `Queued` onwards.
#[derive(Debug)]
pub struct Request {
    pub app_identifier: String,
    pub push_info: Arc<PushInfo>,
    pub body: Vec<u8>,
    pub retry_count: u32,
    push_type: PushType,
    /// Set by `GenericHttpClient::make_request`; the URL template to expand
    /// against `push_info` once dispatched. Unused by provider-native clients.
    url_template: Option<String>,
    state: RequestState,
    completion: Option<oneshot::Sender<RequestState>>,
}

impl Request {
    pub fn new(app_identifier: impl Into<String>, push_info: Arc<PushInfo>, body: Vec<u8>) -> Self {
        Self {
            app_identifier: app_identifier.into(),
            push_info,
            body,
            retry_count: 0,
            push_type: PushType::Message,
            url_template: None,
            state: RequestState::Created,
            completion: None,
        }
    }

    pub fn push_type(&self) -> PushType {
        self.push_type
    }

    pub fn set_push_type(&mut self, push_type: PushType) {
        self.push_type = push_type;
    }

    pub fn set_url_template(&mut self, url_template: String) {
        self.url_template = Some(url_template);
    }

    /// The generic client's URL template, expanded by its dispatch handler.
    pub fn body_url_placeholder(&self) -> String {
        self.url_template.clone().unwrap_or_default()
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Attaches the completion channel and returns the receiver half; called
    /// exactly once, when the client accepts the request into its queue.
    pub fn attach_completion(&mut self) -> oneshot::Receiver<RequestState> {
        let (tx, rx) = oneshot::channel();
        self.completion = Some(tx);
        rx
    }

    /// True once the caller has dropped its completion receiver before the
    /// request reached the wire (§5 cancellation semantics): the client's
    /// dispatch loop checks this immediately before transmitting and, if
    /// true, drops the request instead of sending it.
    pub fn is_abandoned(&self) -> bool {
        !self.state.is_terminal()
            && self
                .completion
                .as_ref()
                .is_some_and(oneshot::Sender::is_closed)
    }

    pub fn transition(&mut self, next: RequestState) -> Result<(), IllegalTransition> {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return Err(IllegalTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        self.state = next.clone();
        if next.is_terminal() {
            if let Some(tx) = self.completion.take() {
                let _ = tx.send(next);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::types::{Destination, PayloadCategory, PushType};

    fn sample_info() -> Arc<PushInfo> {
        Arc::new(
            PushInfo::builder("app1", PayloadCategory::Message)
                .destination(PushType::Message, Destination::new("tok", "apns"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn transitions_monotonically() {
        let mut request = Request::new("app1", sample_info(), vec![]);
        let mut rx = request.attach_completion();
        request.transition(RequestState::Queued).unwrap();
        request.transition(RequestState::InProgress).unwrap();
        request.transition(RequestState::Successful).unwrap();
        assert!(request.transition(RequestState::InProgress).is_err());
        assert_eq!(
            rx.try_recv().unwrap(),
            RequestState::Successful
        );
    }

    #[test]
    fn rejects_backward_transition() {
        let mut request = Request::new("app1", sample_info(), vec![]);
        request.transition(RequestState::Queued).unwrap();
        request.transition(RequestState::InProgress).unwrap();
        assert!(request.transition(RequestState::Queued).is_err());
    }

    #[test]
    fn abandoned_once_receiver_dropped_before_terminal() {
        let mut request = Request::new("app1", sample_info(), vec![]);
        let rx = request.attach_completion();
        drop(rx);
        assert!(request.is_abandoned());
    }
}
