// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use sipcore::push::{
    Destination, GenericHttpClient, HttpMethod, HttpProtocol, PayloadCategory, PushClient,
    PushInfo, PushType, RequestState,
};

/// Scenario: a generic client configured against a mock operator endpoint
/// delivers a request end-to-end and reaches `Successful`.
#[tokio::test]
async fn generic_client_delivers_successfully() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", mockito::Matcher::Regex(r"^/push.*".to_string()))
        .with_status(200)
        .create_async()
        .await;

    let url = format!("{}/push?app={{app-id}}&token={{token}}", server.url());
    let client = GenericHttpClient::new(
        "generic",
        url,
        HttpMethod::Get,
        HttpProtocol::Http,
        std::sync::Weak::new(),
    )
    .unwrap();

    let info = Arc::new(
        PushInfo::builder("app1", PayloadCategory::Message)
            .destination(PushType::Message, Destination::new("tok-1", "custom"))
            .build()
            .unwrap(),
    );
    let request = client.make_request(PushType::Message, info).unwrap();
    let receiver = client.send_push(request).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .expect("request did not complete in time")
        .unwrap();

    assert_eq!(outcome, RequestState::Successful);
    mock.assert_async().await;
}

/// Scenario 4 (queue overflow), at the client level: flooding a client with
/// more requests than its dispatcher can possibly drain before they're all
/// submitted eventually surfaces `QueueFull` from `send_push` without ever
/// blocking the caller. The exact bound itself is covered deterministically
/// by `BoundedQueue`'s own unit tests; this exercises the same behavior
/// through the public `PushClient` surface.
#[tokio::test]
async fn queue_overflow_rejects_synchronously() {
    // Every response is held open for longer than this test runs, so the
    // single-concurrency dispatch worker never frees a slot mid-flood.
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_chunked_body(|_| {
            std::thread::sleep(Duration::from_secs(30));
            Ok(())
        })
        .create_async()
        .await;

    let client = Arc::new(
        GenericHttpClient::new(
            "generic",
            format!("{}/push", server.url()),
            HttpMethod::Get,
            HttpProtocol::Http,
            std::sync::Weak::new(),
        )
        .unwrap(),
    );

    let info = Arc::new(
        PushInfo::builder("app1", PayloadCategory::Message)
            .destination(PushType::Message, Destination::new("tok-1", "custom"))
            .build()
            .unwrap(),
    );

    let mut saw_queue_full = false;
    for _ in 0..512 {
        let request = client
            .make_request(PushType::Message, info.clone())
            .unwrap();
        if client.send_push(request).await.is_err() {
            saw_queue_full = true;
            break;
        }
    }

    assert!(
        saw_queue_full,
        "expected at least one send_push to be rejected with QueueFull"
    );
}
