//! Backup driver round trip against a fake server: force-overwrite
//! refusal, then a full prepare/receive/finish cycle with the header
//! patched back at the end.

mod common;

use bytes::Bytes;
use rye_client_rs::protocol::buffer::PackedWriter;
use rye_client_rs::protocol::codec::{pack_lsa, Lsa};
use rye_client_rs::protocol::constants::{
    Opcode, BK_BACKUP_HEADER_IO_SIZE, BK_BACKUP_PAGE_OVERHEAD, FULL_LEVEL_EXP,
};
use rye_client_rs::{run_backup, BackupOptions, ConnectParams, Connection, Error};

fn session_reply(_req: Bytes) -> Bytes {
    let mut w = PackedWriter::new();
    w.write_u64(1);
    w.write_u64(1);
    w.freeze()
}

fn backup_prepare_reply(_req: Bytes) -> Bytes {
    let mut w = PackedWriter::new();
    w.write_bytes(b"RYE_BACKUP_v0001");
    w.write_i32(1); // db_version
    w.write_i32(1); // header_version
    w.align8();
    w.write_i64(1000); // db_creation_time
    w.write_i64(2000); // start_time
    w.write_string_prefixed("demodb");
    w.write_string_prefixed("localhost");
    w.write_i32(64); // server_io_page_size
    pack_lsa(&mut w, &Lsa { pageid: 1, offset: 0 });
    w.write_i32(64); // backup_io_page_size
    w.write_i32(0); // first_arv_needed
    w.write_i32(0); // run_nxchkpt_atpageid
    w.write_i32(1); // num_perm_vols
    w.freeze()
}

fn vol_start_reply(page_len: usize) -> Bytes {
    let mut w = PackedWriter::new();
    w.write_i32(0); // VolStart
    w.write_i32(page_len as i32);
    w.write_zeros(page_len);
    w.freeze()
}

fn vol_end_reply() -> Bytes {
    let mut w = PackedWriter::new();
    w.write_i32(1); // VolEnd
    w.write_i32(0);
    w.freeze()
}

fn backup_end_reply(tag: i32, lsa: Lsa, end_time: i64) -> Bytes {
    let mut w = PackedWriter::new();
    w.write_i32(tag);
    w.write_i32(0);
    pack_lsa(&mut w, &lsa);
    w.write_i64(end_time);
    w.freeze()
}

async fn connect_to(addr: std::net::SocketAddr) -> Connection {
    let params = ConnectParams {
        host: addr.ip().to_string(),
        port: addr.port(),
        database: "demodb".to_string(),
        user: "public".to_string(),
        program: "test".to_string(),
    };
    Connection::connect(&params).await.expect("connect")
}

#[tokio::test]
async fn force_overwrite_false_refuses_an_existing_destination() {
    let path = std::env::temp_dir().join(format!("rye_backup_refuse_{}.bk", std::process::id()));
    tokio::fs::write(&path, b"not a backup").await.unwrap();

    let addr = common::FakeServer::new()
        .on(Opcode::CsessionFindOrCreateSession as u16, session_reply)
        .on(Opcode::BackupPrepare as u16, backup_prepare_reply)
        .spawn()
        .await;
    let mut conn = connect_to(addr).await;

    let opts = BackupOptions {
        num_threads: 1,
        do_compress: false,
        sleep_msecs: 0,
        make_slave: false,
        force_overwrite: false,
    };
    let err = conn.backup_prepare(&path, &opts).await.unwrap_err();
    assert!(matches!(err, Error::BackupDestinationExists { .. }));

    let contents = tokio::fs::read(&path).await.unwrap();
    assert_eq!(contents, b"not a backup");

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn full_backup_writes_header_receives_volumes_and_patches_back() {
    let path = std::env::temp_dir().join(format!("rye_backup_full_{}.bk", std::process::id()));
    tokio::fs::write(&path, b"stale contents from a previous run").await.unwrap();

    let final_lsa = Lsa { pageid: 99, offset: 5 };
    let final_end_time = 123456789;

    let addr = common::FakeServer::new()
        .on(Opcode::CsessionFindOrCreateSession as u16, session_reply)
        .on(Opcode::BackupPrepare as u16, backup_prepare_reply)
        .on_sequence(
            Opcode::BackupVolume as u16,
            vec![
                Box::new(|_| vol_start_reply(50)),
                Box::new(|_| vol_end_reply()),
                Box::new(move |_| backup_end_reply(3, final_lsa, final_end_time)),
            ],
        )
        .on_sequence(
            Opcode::BackupLogVolume as u16,
            vec![Box::new(move |_| backup_end_reply(4, final_lsa, final_end_time))],
        )
        .spawn()
        .await;
    let mut conn = connect_to(addr).await;

    let opts = BackupOptions {
        num_threads: 1,
        do_compress: false,
        sleep_msecs: 0,
        make_slave: false,
        force_overwrite: true,
    };
    let header = run_backup(&mut conn, &path, opts).await.expect("backup");

    assert_eq!(header.backuptime_lsa, final_lsa);
    assert_eq!(header.end_time, final_end_time);

    let io_size = (header.backup_io_page_size as usize) * FULL_LEVEL_EXP + BK_BACKUP_PAGE_OVERHEAD;
    let expected_total = BK_BACKUP_HEADER_IO_SIZE + 50 + io_size;
    let on_disk = tokio::fs::metadata(&path).await.unwrap();
    assert_eq!(on_disk.len() as usize, expected_total);

    let head_bytes = tokio::fs::read(&path).await.unwrap();
    assert_eq!(&head_bytes[0..16], b"RYE_BACKUP_v0001");

    tokio::fs::remove_file(&path).await.unwrap();
}
