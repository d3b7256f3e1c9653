//! The three front ends observe one datastore.

mod common;

use mgmtd::snmp::{ErrorStatus, Pdu, PduType, Value as SnmpValue, VarBind, Version};
use serde_json::{Value, json};

const MIB: &str = "1.3.6.1.4.1.53864.5";

fn mib(suffix: &str) -> String {
    format!("{}.{}", MIB, suffix)
}

#[tokio::test]
async fn test_restconf_write_visible_to_netconf_and_snmp() {
    let server = common::TestServer::spawn().await;
    assert_eq!(server.snmp_get(&mib("1.2.0")).await, SnmpValue::Gauge32(2));

    let response = server
        .post_json(
            "/subscribers",
            &json!({"imsi": "001010000000003", "profile": {"qos-profile-id": "qos-voice"}}),
        )
        .await;
    assert_eq!(response.status(), 201);

    let mut client = server.netconf().await;
    let reply = client.rpc("<get/>").await;
    assert!(reply.contains("<imsi>001010000000003</imsi>"));

    assert_eq!(server.snmp_get(&mib("1.2.0")).await, SnmpValue::Gauge32(3));

    server.shutdown().await;
}

#[tokio::test]
async fn test_netconf_commit_bumps_snmp_version() {
    let server = common::TestServer::spawn().await;
    let SnmpValue::Counter32(before) = server.snmp_get(&mib("1.7.0")).await else {
        panic!("running version is a Counter32");
    };

    let mut client = server.netconf().await;
    client.rpc("<lock><target><candidate/></target></lock>").await;
    client
        .rpc(
            "<edit-config><target><candidate/></target><config>\
             <qos-profiles><id>qos-n</id><five-qi>2</five-qi><priority>40</priority></qos-profiles>\
             </config></edit-config>",
        )
        .await;
    assert!(client.rpc("<commit/>").await.contains("<ok/>"));

    assert_eq!(server.snmp_get(&mib("1.7.0")).await, SnmpValue::Counter32(before + 1));
    assert_eq!(server.snmp_get(&mib("1.6.0")).await, SnmpValue::Gauge32(3));

    server.shutdown().await;
}

#[tokio::test]
async fn test_snmp_set_admin_state() {
    let server = common::TestServer::spawn().await;
    let amf_admin = mib("2.1.5.1");

    // Read-only community may not write.
    let response = server
        .snmp(
            Version::V2c,
            "public",
            PduType::Set,
            &[&amf_admin],
            vec![SnmpValue::Integer(1)],
        )
        .await
        .unwrap();
    assert_eq!(response.pdu.error_status, ErrorStatus::NoAccess.code());

    let response = server
        .snmp(
            Version::V2c,
            "private",
            PduType::Set,
            &[&amf_admin],
            vec![SnmpValue::Integer(1)],
        )
        .await
        .unwrap();
    assert_eq!(response.pdu.error_status, 0);

    let body: Value = server.get("/network-functions/amf/amf-1").await.json().await.unwrap();
    assert_eq!(body["amf"][0]["admin-state"], "locked");
    assert_eq!(server.snmp_get(&amf_admin).await, SnmpValue::Integer(1));

    // Only the admin-state column is writable.
    let response = server
        .snmp(
            Version::V2c,
            "private",
            PduType::Set,
            &[&mib("1.2.0")],
            vec![SnmpValue::Integer(1)],
        )
        .await
        .unwrap();
    assert_eq!(response.pdu.error_status, ErrorStatus::NotWritable.code());

    server.shutdown().await;
}

#[tokio::test]
async fn test_snmp_walk_and_bulk() {
    let server = common::TestServer::spawn().await;

    let response = server
        .snmp(Version::V2c, "public", PduType::GetNext, &[MIB], Vec::new())
        .await
        .unwrap();
    assert_eq!(response.pdu.varbinds[0].oid.to_string(), mib("1.1.0"));
    assert_eq!(response.pdu.varbinds[0].value, SnmpValue::Gauge32(3));

    // GetBulk: no non-repeaters, five repetitions down the name column.
    let bulk = Pdu {
        pdu_type: PduType::GetBulk,
        request_id: 0,
        error_status: 0,
        error_index: 5,
        varbinds: vec![VarBind::new(mib("2.1.1").parse().unwrap(), SnmpValue::Null)],
    };
    let response = server.snmp_pdu(Version::V2c, "public", bulk).await.unwrap();
    let names: Vec<SnmpValue> = response.pdu.varbinds.iter().map(|vb| vb.value.clone()).collect();
    assert_eq!(
        names,
        ["AMF", "SMF", "UPF", "AUSF", "UDM"].map(SnmpValue::string).to_vec()
    );

    let end = server
        .snmp(Version::V2c, "public", PduType::GetNext, &[&mib("9")], Vec::new())
        .await
        .unwrap();
    assert_eq!(end.pdu.varbinds[0].value, SnmpValue::EndOfMibView);

    // SNMPv1 reports unknown objects as noSuchName.
    let v1 = server
        .snmp(Version::V1, "public", PduType::Get, &[&mib("9.0")], Vec::new())
        .await
        .unwrap();
    assert_eq!(v1.pdu.error_status, ErrorStatus::NoSuchName.code());
    assert_eq!(v1.pdu.error_index, 1);

    // Unknown community gets no answer at all.
    assert!(
        server
            .snmp(Version::V2c, "guess", PduType::Get, &[&mib("1.1.0")], Vec::new())
            .await
            .is_none()
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_netconf_running_lock_blocks_restconf_writes() {
    let server = common::TestServer::spawn().await;
    let mut client = server.netconf().await;
    client.rpc("<lock><target><running/></target></lock>").await;

    let response = server
        .patch_json("/subscribers/001010000000002", &json!({"state": "registered"}))
        .await;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ietf-restconf:errors"]["error"][0]["error-tag"], "lock-denied");

    client.rpc("<unlock><target><running/></target></unlock>").await;
    let response = server
        .patch_json("/subscribers/001010000000002", &json!({"state": "registered"}))
        .await;
    assert_eq!(response.status(), 204);

    server.shutdown().await;
}
