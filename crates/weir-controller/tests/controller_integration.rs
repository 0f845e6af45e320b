//! Controller registry behavior over the wire.

use std::sync::Arc;
use tokio::sync::broadcast;
use weir_client::ControllerClient;
use weir_controller::{ControllerService, TopicRegistry};
use weir_protocol::{ErrorCode, Server};

async fn start_controller() -> (String, broadcast::Sender<()>) {
    let service = Arc::new(ControllerService::new(
        Arc::new(TopicRegistry::new()),
        "127.0.0.1".into(),
        9092,
    ));
    let (shutdown_tx, _) = broadcast::channel(1);
    let server = Server::bind("127.0.0.1:0", service, shutdown_tx.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    (addr, shutdown_tx)
}

#[tokio::test]
async fn topic_lifecycle() {
    let (addr, shutdown) = start_controller().await;
    let mut client = ControllerClient::connect(&addr).await.unwrap();

    client.create_topic("orders", 6, 1).await.unwrap();
    client.create_topic("events", 3, 1).await.unwrap();

    assert_eq!(
        client.list_topics().await.unwrap(),
        vec!["events".to_string(), "orders".into()]
    );

    let partitions = client.describe_topic("orders").await.unwrap();
    assert_eq!(partitions.len(), 6);
    for (i, p) in partitions.iter().enumerate() {
        assert_eq!(p.partition, i as i32);
        assert_eq!(p.high_watermark, 0);
        assert_eq!(p.isr, p.replicas);
    }

    client.delete_topic("events").await.unwrap();
    assert_eq!(
        client.list_topics().await.unwrap(),
        vec!["orders".to_string()]
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn duplicate_create_is_already_exists() {
    let (addr, shutdown) = start_controller().await;
    let mut client = ControllerClient::connect(&addr).await.unwrap();

    client.create_topic("t", 1, 1).await.unwrap();
    let err = client.create_topic("t", 1, 1).await.unwrap_err();
    match err {
        weir_client::Error::Rpc { code, .. } => assert_eq!(code, ErrorCode::AlreadyExists),
        other => panic!("unexpected error {other:?}"),
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn find_leader_resolves_broker_endpoint() {
    let (addr, shutdown) = start_controller().await;
    let mut client = ControllerClient::connect(&addr).await.unwrap();

    client.create_topic("t", 3, 1).await.unwrap();

    let (broker_id, host, port) = client.find_leader("t", 2).await.unwrap();
    assert_eq!(broker_id, 2);
    assert_eq!(host, "127.0.0.1");
    assert_eq!(port, 9094);

    let err = client.find_leader("t", 9).await.unwrap_err();
    match err {
        weir_client::Error::Rpc { code, .. } => assert_eq!(code, ErrorCode::NotFound),
        other => panic!("unexpected error {other:?}"),
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn describe_unknown_topic_is_not_found() {
    let (addr, shutdown) = start_controller().await;
    let mut client = ControllerClient::connect(&addr).await.unwrap();

    let err = client.describe_topic("ghost").await.unwrap_err();
    match err {
        weir_client::Error::Rpc { code, .. } => assert_eq!(code, ErrorCode::NotFound),
        other => panic!("unexpected error {other:?}"),
    }

    let _ = shutdown.send(());
}
