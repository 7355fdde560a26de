use anyhow::Result;
use blockfeed::{
    coinbase::CoinbaseData,
    message::{MsgBlock, Request, WsMsg},
    registry::Topic,
    test_utils::{connected, disconnected, new_coinbase_transaction},
};
use serde_json::{Value, json};

#[test]
fn test_connected_message_has_no_coinbase() -> Result<()> {
    let event = connected(101, 1_700_000_000, 1);
    let msg = WsMsg::from(MsgBlock::connected(&event));
    let value = serde_json::to_value(&msg)?;
    assert_eq!(value["type"], "Block");
    assert_eq!(value["msg_type"], "BLK_CONNECTED");
    assert_eq!(value["block_hash"], event.block_hash.to_string());
    assert_eq!(value["block_height"], 101);
    assert_eq!(value["block_timestamp"], 1_700_000_000);
    assert!(value.get("coinbase_data").is_none());
    Ok(())
}

#[test]
fn test_disconnected_message_carries_coinbase() -> Result<()> {
    let event = disconnected(101, 1_700_000_000, 1);
    let coinbase = CoinbaseData::from_transaction(&new_coinbase_transaction(101, 9));
    let msg = MsgBlock::disconnected(&event, Some(coinbase.clone()));
    assert_eq!(msg.coinbase_data(), Some(&coinbase));
    assert_eq!(msg.block_height(), 101);
    assert_eq!(msg.block_hash(), event.block_hash);

    let value = serde_json::to_value(WsMsg::Block(msg.clone()))?;
    assert_eq!(value["msg_type"], "BLK_DISCONNECTED");
    let data = &value["coinbase_data"];
    assert_eq!(data["coinbase_scriptsig"], hex::encode(&coinbase.coinbase_scriptsig));
    assert_eq!(data["coinbase_outputs"][0]["value"], 5_000_000_000u64);
    assert_eq!(
        data["coinbase_outputs"][0]["output_script"],
        hex::encode(&coinbase.coinbase_outputs[0].output_script)
    );

    let decoded: WsMsg = serde_json::from_value(value)?;
    assert_eq!(decoded, WsMsg::Block(msg));
    Ok(())
}

#[test]
fn test_disconnected_without_coinbase_omits_field() -> Result<()> {
    let msg = MsgBlock::disconnected(&disconnected(5, 10, 2), None);
    let value = serde_json::to_value(WsMsg::Block(msg))?;
    assert_eq!(value["msg_type"], "BLK_DISCONNECTED");
    assert!(value.get("coinbase_data").is_none());
    Ok(())
}

#[test]
fn test_coinbase_from_transaction() {
    let tx = new_coinbase_transaction(42, 3);
    let data = CoinbaseData::from_transaction(&tx);
    assert_eq!(data.coinbase_scriptsig, tx.input[0].script_sig.to_bytes());
    assert_eq!(data.coinbase_outputs.len(), 2);
    assert_eq!(data.coinbase_outputs[0].value, 5_000_000_000);
    assert_eq!(data.coinbase_outputs[1].value, 0);
    assert_eq!(
        data.coinbase_outputs[1].output_script,
        tx.output[1].script_pubkey.to_bytes()
    );
}

#[test]
fn test_control_requests() -> Result<()> {
    let request: Request = serde_json::from_value(json!({"type": "Subscribe", "topic": "blocks"}))?;
    assert_eq!(request, Request::Subscribe { topic: Topic::Blocks });
    assert_eq!(request.topic(), Topic::Blocks);

    let request: Request =
        serde_json::from_value(json!({"type": "Unsubscribe", "topic": "blocks"}))?;
    assert_eq!(request, Request::Unsubscribe { topic: Topic::Blocks });

    assert!(serde_json::from_value::<Request>(json!({"type": "Subscribe", "topic": "mempool"})).is_err());
    assert!(serde_json::from_value::<Request>(json!({"type": "Subscribe"})).is_err());
    assert!(serde_json::from_value::<Request>(json!({"type": "Replay", "topic": "blocks"})).is_err());
    Ok(())
}

#[test]
fn test_control_replies() -> Result<()> {
    let value = serde_json::to_value(WsMsg::Subscribed { topic: Topic::Blocks })?;
    assert_eq!(value, json!({"type": "Subscribed", "topic": "blocks"}));
    assert_eq!(WsMsg::Subscribed { topic: Topic::Blocks }.topic(), None);

    let value: Value = serde_json::to_value(WsMsg::Error {
        error: "nope".to_string(),
    })?;
    assert_eq!(value, json!({"type": "Error", "error": "nope"}));
    Ok(())
}
