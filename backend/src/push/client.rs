// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use tokio::sync::oneshot;

use crate::push::errors::{ClientError, ServiceError};
use crate::push::request::{Request, RequestState};
use crate::push::types::{PushInfo, PushType};

/// Upstream boundary a provider client reports a rejected device token to,
/// mirroring how `conference::Registrar` models the registrar boundary
/// (§4.3): the client never talks to a concrete registration store, only to
/// whatever implements this trait.
#[async_trait]
pub trait TokenRegistrar: Send + Sync {
    /// Called once a provider has terminally rejected `token` as
    /// unregistered (e.g. APNs `:status 410`), so the owning registration
    /// can be flagged for invalidation upstream.
    async fn invalidate(&self, client: &str, token: &str);
}

/// Capability set shared by every provider transport (§4.2, §9 design
/// note: a tagged capability set, not an inheritance hierarchy).
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Registry key; also `Request::app_identifier` for provider-specific
    /// clients.
    fn name(&self) -> &str;

    /// Builds a `Request` for `push_type` against `info`, without enqueueing
    /// it (state `Created`).
    fn make_request(
        &self,
        push_type: PushType,
        info: Arc<PushInfo>,
    ) -> Result<Request, ServiceError>;

    /// Enqueues `request` (state `Created -> Queued`) and returns a receiver
    /// resolved once the request reaches a terminal state. Returns
    /// `ClientError::QueueFull` synchronously without blocking (§4.2).
    async fn send_push(
        &self,
        request: Request,
    ) -> Result<oneshot::Receiver<RequestState>, ClientError>;

    /// `true` iff the queue is empty and no request is `InProgress` (§3).
    fn is_idle(&self) -> bool;
}

/// Per-client counters (§4.2: "each client exposes counters for sent,
/// succeeded, failed-by-reason"), backed by the `metrics` facade the same
/// way the host's gRPC layer backs its counters.
#[derive(Debug, Default)]
pub struct ClientStats {
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ClientStats {
    pub fn describe() {
        describe_counter!("push_client_sent_total", "Pushes handed to the transport.");
        describe_counter!(
            "push_client_succeeded_total",
            "Pushes that reached a Successful terminal state."
        );
        describe_counter!(
            "push_client_failed_total",
            "Pushes that reached a Failed terminal state, by reason."
        );
    }

    pub fn record_sent(&self, client: &str) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        counter!("push_client_sent_total", "client" => client.to_owned()).increment(1);
    }

    pub fn record_succeeded(&self, client: &str) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        counter!("push_client_succeeded_total", "client" => client.to_owned()).increment(1);
    }

    pub fn record_failed(&self, client: &str, reason: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        counter!(
            "push_client_failed_total",
            "client" => client.to_owned(),
            "reason" => reason.to_owned(),
        )
        .increment(1);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Tracks the number of requests currently `InProgress` for a client, so
/// `is_idle()` can be computed as `queue.is_empty() && in_flight == 0`
/// without walking the queue.
#[derive(Debug, Default)]
pub struct InFlightCounter(AtomicU64);

impl InFlightCounter {
    pub fn enter(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn leave(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}
