// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use sipcore::push::{ConfigurationError, FirebaseConfig, PushService};

/// Scenario 6 (configuration duplicate): an `appId` present in both the
/// legacy and v1 sets is rejected at setup time and neither client family
/// is registered.
#[tokio::test]
async fn rejects_duplicate_app_id_across_legacy_and_v1() {
    let service = PushService::new();

    let config = FirebaseConfig {
        projects_api_keys: vec![("app1".to_string(), "legacy-key".to_string())],
        service_accounts: vec![("app1".to_string(), "/nonexistent/service-account.json".to_string())],
        default_refresh_interval: Duration::from_secs(3600),
        token_expiration_anticipation: Duration::from_secs(300),
        token_helper_path: "/bin/true".to_string(),
    };

    let error = service.setup_firebase_clients(config).await.unwrap_err();
    assert!(matches!(error, ConfigurationError::DuplicateAppId { app_id } if app_id == "app1"));
    assert!(service.is_idle());
}

/// A service with nothing registered and no fallback cannot route a
/// request for an unknown provider.
#[tokio::test]
async fn unsupported_provider_without_fallback() {
    use sipcore::push::{Destination, PayloadCategory, PushInfo, PushType, ServiceError};

    let service = PushService::new();
    let info = PushInfo::builder("app1", PayloadCategory::Message)
        .destination(PushType::Message, Destination::new("tok", "unknown-provider"))
        .build()
        .unwrap();

    let error = service.make_request(PushType::Message, info).unwrap_err();
    assert!(matches!(error, ServiceError::UnsupportedProvider));
}
