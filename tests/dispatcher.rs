use anyhow::Result;
use blockfeed::{
    dispatcher::{Delivery, Dispatcher},
    message::{MsgBlock, WsMsg},
    registry::ConnectionId,
    test_utils::connected,
};

fn block(i: u32) -> WsMsg {
    WsMsg::Block(MsgBlock::connected(&connected(i as u64, i as i64, i)))
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let dispatcher = Dispatcher::new(1);
    let a = dispatcher.open().await;
    let b = dispatcher.open().await;
    assert_ne!(a.id, b.id);
    assert_eq!(dispatcher.session_count().await, 2);
    assert!(dispatcher.close(a.id).await);
    assert!(!dispatcher.close(a.id).await);
    assert_eq!(dispatcher.session_count().await, 1);
}

#[tokio::test]
async fn test_full_queue_evicts_only_that_session() -> Result<()> {
    let dispatcher = Dispatcher::new(2);
    let mut fast = dispatcher.open().await;
    let slow = dispatcher.open().await;
    let ids = [fast.id, slow.id];

    for i in 0..2 {
        let delivery = dispatcher.deliver(&block(i), &ids).await;
        assert_eq!(delivery.delivered, 2);
        assert_eq!(fast.receiver.recv().await, Some(block(i)));
    }

    let delivery = dispatcher.deliver(&block(2), &ids).await;
    assert_eq!(
        delivery,
        Delivery {
            delivered: 1,
            slow_consumers: vec![slow.id],
            stale: 0,
        }
    );
    assert!(slow.evicted.is_cancelled());
    assert!(!fast.evicted.is_cancelled());
    assert_eq!(fast.receiver.recv().await, Some(block(2)));
    assert_eq!(dispatcher.session_count().await, 1);

    // the evicted session is gone; later sends to it are no-ops
    let delivery = dispatcher.deliver(&block(3), &ids).await;
    assert_eq!(delivery.delivered, 1);
    assert_eq!(delivery.stale, 1);
    assert!(delivery.slow_consumers.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dropped_receiver_is_stale() {
    let dispatcher = Dispatcher::new(4);
    let handle = dispatcher.open().await;
    let id = handle.id;
    drop(handle);

    let delivery = dispatcher.deliver(&block(1), &[id, ConnectionId(999)]).await;
    assert_eq!(delivery.delivered, 0);
    assert_eq!(delivery.stale, 2);
    assert_eq!(dispatcher.session_count().await, 0);
}
