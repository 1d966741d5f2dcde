//! End-to-end exercise of prepare/execute/iterate/end against a fake
//! server speaking the packed wire protocol directly.

mod common;

use bytes::Bytes;
use rye_client_rs::protocol::buffer::PackedWriter;
use rye_client_rs::protocol::codec::{pack_value, XaslId};
use rye_client_rs::protocol::constants::{Opcode, QUERY_END};
use rye_client_rs::value::{DbValue, Oid};
use rye_client_rs::{ConnectParams, Connection, Error, ExecuteStatus, NavOutcome};

fn session_reply(_req: Bytes) -> Bytes {
    let mut w = PackedWriter::new();
    w.write_u64(1); // session id
    w.write_u64(1); // session key
    w.freeze()
}

fn prepare_reply(_req: Bytes) -> Bytes {
    let mut w = PackedWriter::new();
    let xasl = XaslId { bytes: [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] };
    rye_client_rs::protocol::codec::pack_xasl_id(&mut w, &xasl);
    w.write_u8(0); // no node header
    w.align8();
    w.freeze()
}

fn execute_reply(rows: &[i32]) -> impl Fn(Bytes) -> Bytes + Send + 'static {
    let rows = rows.to_vec();
    move |_req: Bytes| {
        let mut w = PackedWriter::new();
        w.write_u32(QUERY_END);
        w.write_u64(7); // query id
        w.write_u8(0); // status_flag: ok
        w.align8();
        w.write_i32(rows.len() as i32);
        w.write_i32(1); // column count
        for v in &rows {
            pack_value(&mut w, &DbValue::Integer(*v));
        }
        w.freeze()
    }
}

fn empty_reply(_req: Bytes) -> Bytes {
    Bytes::new()
}

#[tokio::test]
async fn prepared_query_iterates_all_tuples_and_closes_on_end() {
    let addr = common::FakeServer::new()
        .on(Opcode::CsessionFindOrCreateSession as u16, session_reply)
        .on(Opcode::QmgrPrepareQuery as u16, prepare_reply)
        .on(Opcode::QmgrExecuteQuery as u16, execute_reply(&[10, 20, 30]))
        .on(Opcode::QmgrEndQuery as u16, empty_reply)
        .spawn()
        .await;

    let params = ConnectParams {
        host: addr.ip().to_string(),
        port: addr.port(),
        database: "demodb".to_string(),
        user: "public".to_string(),
        program: "test".to_string(),
    };
    let mut conn = Connection::connect(&params).await.expect("connect");

    let plan = conn
        .qmgr_prepare_query("select a from t where b = ?", "select a from t where b = ?", Oid::NULL, &[])
        .await
        .expect("prepare");
    assert!(!plan.xasl_id.is_null());

    let (handle, status) = conn
        .qmgr_execute_query(plan.xasl_id, &[DbValue::Integer(42)], false)
        .await
        .expect("execute");
    assert_eq!(status, ExecuteStatus::Ok);
    assert_eq!(conn.tuple_count(handle).unwrap(), 3);

    let mut seen = Vec::new();
    while conn.next_tuple(handle).unwrap() == NavOutcome::Ok {
        let v = conn.get_tuple_value(handle, 0).unwrap();
        seen.push(v);
    }
    assert_eq!(seen, vec![DbValue::Integer(10), DbValue::Integer(20), DbValue::Integer(30)]);

    conn.qmgr_end_query(handle).await.expect("end query");
    assert!(matches!(conn.tuple_count(handle), Err(Error::OprOnClosedQres)));
}

#[tokio::test]
async fn commit_without_a_transaction_short_circuits_locally() {
    // No opcode table needed: `tran_server_commit` must not touch the
    // wire when the client record says the server isn't in a
    // transaction, so connecting alone exercises the short-circuit.
    let addr = common::FakeServer::new()
        .on(Opcode::CsessionFindOrCreateSession as u16, session_reply)
        .spawn()
        .await;

    let params = ConnectParams {
        host: addr.ip().to_string(),
        port: addr.port(),
        database: "demodb".to_string(),
        user: "public".to_string(),
        program: "test".to_string(),
    };
    let mut conn = Connection::connect(&params).await.expect("connect");

    let state = conn.tran_server_commit(false).await.expect("commit");
    assert_eq!(state, rye_client_rs::transaction::TranState::Committed);
}
