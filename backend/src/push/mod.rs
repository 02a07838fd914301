// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Push notification dispatch: routes outbound `PushInfo` intents to
//! per-provider transport clients (APNs, FCM legacy, FCM v1, operator-
//! configured generic endpoints).

mod apple;
mod client;
mod dispatch;
mod errors;
mod firebase_legacy;
mod firebase_v1;
mod generic;
mod queue;
mod request;
mod retry;
mod service;
mod token_manager;
mod types;

pub use apple::AppleClient;
pub use client::{ClientStats, PushClient, TokenRegistrar};
pub use errors::{ClientError, ConfigurationError, ServiceError, TokenManagerError};
pub use firebase_legacy::FirebaseLegacyClient;
pub use firebase_v1::FirebaseV1Client;
pub use generic::{GenericHttpClient, HttpMethod, HttpProtocol};
pub use request::{IllegalTransition, Request, RequestState};
pub use retry::RetryPolicy;
pub use service::{FirebaseConfig, PushService};
pub use token_manager::{AccessToken, TokenManager};
pub use types::{Destination, EmptyDestinations, PayloadCategory, PushInfo, PushInfoBuilder, PushType};
