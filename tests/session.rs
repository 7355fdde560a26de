use std::collections::HashSet;

use anyhow::Result;
use blockfeed::{
    dispatcher::Dispatcher,
    error::NotifyError,
    message::{MsgBlock, Request, WsMsg},
    registry::{Registry, Topic},
    session::{Session, SessionState},
    test_utils::connected,
};

#[tokio::test]
async fn test_session_lifecycle() -> Result<()> {
    let registry = Registry::new();
    let dispatcher = Dispatcher::new(4);
    let handle = dispatcher.open().await;
    let mut session = Session::new(handle.id, registry.clone());
    assert_eq!(session.state(), &SessionState::Open);

    let ack = session
        .handle_request(Request::Subscribe {
            topic: Topic::Blocks,
        })
        .await;
    assert_eq!(ack, Some(WsMsg::Subscribed { topic: Topic::Blocks }));
    assert_eq!(
        session.state(),
        &SessionState::Subscribed(HashSet::from([Topic::Blocks]))
    );
    assert_eq!(registry.snapshot(Topic::Blocks).await, vec![handle.id]);

    let ack = session
        .handle_text(r#"{"type":"Unsubscribe","topic":"blocks"}"#)
        .await?;
    assert_eq!(ack, Some(WsMsg::Unsubscribed { topic: Topic::Blocks }));
    assert_eq!(session.state(), &SessionState::Open);
    assert!(registry.snapshot(Topic::Blocks).await.is_empty());

    session.close(&dispatcher).await;
    assert!(session.is_closed());
    assert_eq!(dispatcher.session_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_subscribe_acks_without_duplicates() -> Result<()> {
    let registry = Registry::new();
    let dispatcher = Dispatcher::new(4);
    let mut handle = dispatcher.open().await;
    let mut session = Session::new(handle.id, registry.clone());
    for _ in 0..3 {
        let ack = session
            .handle_text(r#"{"type":"Subscribe","topic":"blocks"}"#)
            .await?;
        assert_eq!(ack, Some(WsMsg::Subscribed { topic: Topic::Blocks }));
    }
    let ids = registry.snapshot(Topic::Blocks).await;
    assert_eq!(ids, vec![handle.id]);

    let msg = WsMsg::Block(MsgBlock::connected(&connected(1, 1, 1)));
    let delivery = dispatcher.deliver(&msg, &ids).await;
    assert_eq!(delivery.delivered, 1);
    assert_eq!(handle.receiver.try_recv()?, msg);
    assert!(handle.receiver.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_malformed_control_message_changes_nothing() -> Result<()> {
    let registry = Registry::new();
    let dispatcher = Dispatcher::new(4);
    let handle = dispatcher.open().await;
    let mut session = Session::new(handle.id, registry.clone());
    session
        .handle_request(Request::Subscribe {
            topic: Topic::Blocks,
        })
        .await;

    for text in [
        "not json",
        r#"{"type":"Subscribe","topic":"transactions"}"#,
        r#"{"type":"Unsubscribe"}"#,
        r#"{"topic":"blocks"}"#,
    ] {
        let result = session.handle_text(text).await;
        assert!(matches!(
            result,
            Err(NotifyError::MalformedControlMessage(_))
        ));
    }
    assert_eq!(
        session.state(),
        &SessionState::Subscribed(HashSet::from([Topic::Blocks]))
    );
    assert_eq!(registry.snapshot(Topic::Blocks).await, vec![handle.id]);
    Ok(())
}

#[tokio::test]
async fn test_closed_session_ignores_control_messages() -> Result<()> {
    let registry = Registry::new();
    let dispatcher = Dispatcher::new(4);
    let handle = dispatcher.open().await;
    let mut session = Session::new(handle.id, registry.clone());
    session
        .handle_request(Request::Subscribe {
            topic: Topic::Blocks,
        })
        .await;
    session.close(&dispatcher).await;
    assert!(registry.snapshot(Topic::Blocks).await.is_empty());

    let ack = session
        .handle_request(Request::Subscribe {
            topic: Topic::Blocks,
        })
        .await;
    assert_eq!(ack, None);
    assert_eq!(session.state(), &SessionState::Closed);
    assert!(registry.snapshot(Topic::Blocks).await.is_empty());

    // closing twice is harmless
    session.close(&dispatcher).await;
    Ok(())
}
