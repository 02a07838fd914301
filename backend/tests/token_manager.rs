// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use sipcore::push::TokenManager;
use tempfile::NamedTempFile;

/// Writes an executable shell helper that appends one line to `counter_path`
/// per invocation and prints a fixed `HelperOutput` JSON body to stdout.
fn write_counting_helper(counter_path: &std::path::Path) -> NamedTempFile {
    let mut helper = NamedTempFile::new().unwrap();
    writeln!(
        helper,
        "#!/bin/sh\necho invoked >> {}\necho '{{\"access_token\":\"T2\",\"expires_in\":3600}}'",
        counter_path.display()
    )
    .unwrap();
    let mut perms = helper.as_file().metadata().unwrap().permissions();
    perms.set_mode(0o755);
    helper.as_file().set_permissions(perms).unwrap();
    helper
}

/// Scenario 3 (FCM v1 token refresh): the first `current_token` call
/// invokes the helper exactly once; a second call shortly after reuses the
/// cached token without invoking the helper again.
#[tokio::test]
async fn refreshes_once_then_reuses_cached_token() {
    let service_account = NamedTempFile::new().unwrap();
    let counter = NamedTempFile::new().unwrap();
    let helper = write_counting_helper(counter.path());

    let manager = TokenManager::new(
        "app1",
        service_account.path().to_str().unwrap().to_string(),
        helper.path().to_str().unwrap().to_string(),
        Duration::from_secs(0),
        Duration::from_secs(300),
    )
    .await
    .unwrap();

    let first = manager.current_token().await.unwrap();
    assert_eq!(first.token, "T2");

    let second = manager.current_token().await.unwrap();
    assert_eq!(second.token, "T2");

    let invocations = std::fs::read_to_string(counter.path()).unwrap();
    assert_eq!(invocations.lines().count(), 1);
}

/// A missing service-account file is rejected at construction time, the
/// only terminal failure `TokenManager::new` reports.
#[tokio::test]
async fn rejects_missing_service_account_file() {
    let result = TokenManager::new(
        "app1",
        "/nonexistent/service-account.json".to_string(),
        "/bin/true".to_string(),
        Duration::from_secs(0),
        Duration::from_secs(300),
    )
    .await;
    assert!(result.is_err());
}
