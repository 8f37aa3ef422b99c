//! JSON-line replication in and out of a running agent.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sonic_osmgrd::{pump_inbound, pump_outbound, OsMgr, RecordingActuator, ReplicationBridge};
use tokio::io::BufReader;

#[tokio::test]
async fn test_inbound_records_flow_to_outbound_stream() {
    let actuator = Arc::new(RecordingActuator::new());
    let bridge = Arc::new(ReplicationBridge::new(64));
    let outbound = bridge.subscribe();
    let agent = Arc::new(OsMgr::new(actuator.clone(), bridge.clone()));
    agent.inventory().record("eth0");

    let input = concat!(
        r#"{"table":"port","op":"set","row":{"ifname":"eth0","admin_status":"up","speed":"100G"}}"#,
        "\n",
        "this is not json\n",
        "\n",
        r#"{"table":"intf","op":"set","row":{"ifname":"eth0","ipaddr":"10.0.0.1/24"}}"#,
        "\n",
        r#"{"table":"intf","op":"set","row":{"ifname":"eth9","ipaddr":"10.9.0.1/24"}}"#,
        "\n",
    );

    let applied = pump_inbound(BufReader::new(input.as_bytes()), agent.clone())
        .await
        .unwrap();
    assert_eq!(applied, 3);
    assert_eq!(actuator.calls().len(), 2);
    assert_eq!(agent.stats().rejected(), 1);

    // close the channel so the outbound pump finishes
    drop(agent);
    drop(bridge);

    let mut out = Vec::new();
    let written = pump_outbound(outbound, &mut out).await.unwrap();
    assert_eq!(written, 2);

    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["table"], "port");
    assert_eq!(lines[0]["row"]["admin_status"], true);
    assert_eq!(lines[1]["table"], "intf");
    assert_eq!(lines[1]["row"]["ipaddr"], "10.0.0.1/24");
}

#[tokio::test]
async fn test_invalid_utf8_line_does_not_end_inbound_stream() {
    let actuator = Arc::new(RecordingActuator::new());
    let bridge = Arc::new(ReplicationBridge::new(64));
    let agent = Arc::new(OsMgr::new(actuator.clone(), bridge));
    agent.inventory().record("eth0");

    let mut input: Vec<u8> = b"\xff\xfe garbage\n".to_vec();
    input.extend_from_slice(
        br#"{"table":"port","op":"set","row":{"ifname":"eth0","admin_status":"up"}}"#,
    );
    input.push(b'\n');

    let applied = pump_inbound(BufReader::new(input.as_slice()), agent.clone())
        .await
        .unwrap();
    assert_eq!(applied, 1);
    assert_eq!(actuator.calls().len(), 1);
    assert!(agent.applied().port.exists(&"eth0".to_string()));
}
