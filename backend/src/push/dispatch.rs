// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};

use crate::push::client::{ClientStats, InFlightCounter};
use crate::push::errors::ClientError;
use crate::push::queue::BoundedQueue;
use crate::push::request::{Request, RequestState};

/// The dispatch loop shared by every `PushClient` implementation: a bounded
/// queue, a background worker that drains it at a configurable concurrency
/// (1 for HTTP/1.1 clients, N for HTTP/2-multiplexed ones), and the
/// sent/succeeded/failed counters from §4.2.
///
/// Retries happen *inside* a single request's `InProgress` phase (the
/// handler owns the request for its whole lifetime, including backoff
/// sleeps) rather than by re-enqueueing — re-queueing would let a retried
/// request jump ahead of requests enqueued after it, violating the
/// in-order-completion guarantee §5 gives HTTP/1 transports, and would
/// require a backward `InProgress -> Queued` transition that §8 invariant 2
/// forbids.
pub struct Dispatcher {
    name: String,
    queue: BoundedQueue<Request>,
    notify: Notify,
    in_flight: InFlightCounter,
    stats: ClientStats,
}

impl Dispatcher {
    pub fn new(name: impl Into<String>, max_queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue: BoundedQueue::new(max_queue_size),
            notify: Notify::new(),
            in_flight: InFlightCounter::default(),
            stats: ClientStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.count() == 0
    }

    /// Enqueues `request`, already transitioned to `Queued` by the caller.
    /// Synchronous; returns `QueueFull` without blocking (§4.2, §5).
    pub fn enqueue(&self, request: Request) -> Result<(), ClientError> {
        self.queue.try_push(request).map_err(|_| ClientError::QueueFull)?;
        self.notify.notify_one();
        Ok(())
    }

    /// Transitions `request` to its terminal state and records the
    /// matching counter. Called by a dispatch `handler` once it has a
    /// final outcome.
    pub fn finish(&self, mut request: Request, outcome: RequestState) {
        match &outcome {
            RequestState::Successful => self.stats.record_succeeded(&self.name),
            RequestState::Failed { reason } => self.stats.record_failed(&self.name, reason),
            RequestState::Created | RequestState::Queued | RequestState::InProgress => {
                unreachable!("Dispatcher::finish must be called with a terminal state")
            }
        }
        let _ = request.transition(outcome);
    }

    /// Spawns the background worker. `concurrency` bounds the number of
    /// requests handled at once; `handler` drives one request from
    /// `InProgress` to a terminal state (via `finish`) and is itself
    /// responsible for retrying transport failures internally.
    pub fn spawn<F, Fut>(self: &Arc<Self>, concurrency: usize, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let this = self.clone();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                let Some(mut request) = this.queue.pop() else {
                    this.notify.notified().await;
                    continue;
                };
                if request.is_abandoned() {
                    continue;
                }
                let _ = request.transition(RequestState::InProgress);
                this.in_flight.enter();
                this.stats.record_sent(&this.name);

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("dispatcher semaphore is never closed");
                let this = this.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler(request).await;
                    this.in_flight.leave();
                    drop(permit);
                });
            }
        });
    }
}
