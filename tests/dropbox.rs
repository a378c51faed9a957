//! Dropbox client behaviour against a local server that never answers.

use pullsync::config::Secret;
use pullsync::core::{
    DestinationContainer, FetchUrl, Outcome, PollPolicy, TransferItem, TransferOrchestrator,
};
use pullsync::destination::{DestinationService, DropboxClient};
use pullsync::error::ServiceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(200);

/// Accepts connections and holds them open without ever writing a byte.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

async fn client() -> DropboxClient {
    DropboxClient::with_base_url(Secret::new("sl.test"), silent_server().await, REQUEST_TIMEOUT)
        .unwrap()
}

#[tokio::test]
async fn test_unanswered_request_times_out_as_transport_error() {
    let client = client().await;

    let err = timeout(
        Duration::from_secs(5),
        client.save_url("/0123456789/a.txt", &FetchUrl::new("https://example.com/a.txt")),
    )
    .await
    .expect("request is bounded by the client timeout")
    .unwrap_err();

    match err {
        ServiceError::Transport(reason) => {
            assert!(reason.contains("timed out"), "reason: {}", reason)
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unanswered_folder_creation_fails() {
    let client = client().await;

    let result = timeout(Duration::from_secs(5), client.create_folder("/0123456789"))
        .await
        .expect("request is bounded by the client timeout");

    assert!(matches!(result, Err(ServiceError::Transport(_))));
}

#[tokio::test]
async fn test_stalled_destination_does_not_hang_the_run() {
    let service: Arc<dyn DestinationService> = Arc::new(client().await);
    let container = DestinationContainer::new("/0123456789");
    let items = ["a/1.txt", "a/2.txt"]
        .iter()
        .map(|key| {
            let url = FetchUrl::new(format!("https://example.com/{}", key));
            TransferItem::new(*key, url, &container)
        })
        .collect();
    let policy = PollPolicy {
        interval: Duration::from_millis(1),
        max_polls: 1,
    };

    let report = timeout(
        Duration::from_secs(5),
        TransferOrchestrator::new(service, policy).run(items, &container, 1),
    )
    .await
    .expect("run finishes once every request times out")
    .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.failed(), 2);
    for entry in &report.entries {
        match &entry.outcome {
            Outcome::Failure { reason } => {
                assert!(reason.contains("timed out"), "reason: {}", reason)
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
