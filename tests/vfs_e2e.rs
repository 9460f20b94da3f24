use std::time::Duration;

use crossbeam_channel::Receiver;

use enginehost::mock::{MockModule, MockResolver};
use enginehost::protocol::kind;
use enginehost::{
    Command, Encoding, EngineHost, FileData, HostConfig, LoadConfig, Outbound, PathPayload,
    ReadFilePayload, RenamePayload, Reply, ReplyBody, WriteFilePayload,
};

fn loaded_host() -> (EngineHost, Receiver<Outbound>) {
    let host = EngineHost::start(
        HostConfig::default(),
        Box::new(MockResolver::new()),
        Box::new(MockModule::new()),
    );
    let rx = host.outbound();
    host.submit(0, Command::Load(LoadConfig::new("file:///pkg/engine-core.js")))
        .unwrap();
    assert_eq!(recv_reply(&rx).body, ReplyBody::Loaded { first: true });
    (host, rx)
}

fn recv_reply(rx: &Receiver<Outbound>) -> Reply {
    loop {
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Outbound::Reply(reply) => return reply,
            Outbound::Notification(_) => {}
        }
    }
}

#[test]
fn write_then_read_binary_round_trips_with_transfer() {
    let (host, rx) = loaded_host();

    let payload: Vec<u8> = (0..=255).collect();
    host.submit(
        1,
        Command::WriteFile(WriteFilePayload {
            path: "/in.bin".to_string(),
            data: payload.clone(),
        }),
    )
    .unwrap();
    let reply = recv_reply(&rx);
    assert_eq!(reply.kind, kind::WRITE_FILE);
    assert_eq!(reply.body, ReplyBody::Done);

    host.submit(
        2,
        Command::ReadFile(ReadFilePayload {
            path: "/in.bin".to_string(),
            encoding: Encoding::Binary,
        }),
    )
    .unwrap();
    let reply = recv_reply(&rx);
    assert_eq!(reply.kind, kind::READ_FILE);
    assert!(reply.transfer, "binary reads are marked for transfer");
    assert_eq!(reply.body, ReplyBody::File(FileData::Binary(payload)));
}

#[test]
fn write_then_read_utf8_round_trips_by_value() {
    let (host, rx) = loaded_host();

    host.submit(
        1,
        Command::WriteFile(WriteFilePayload {
            path: "/meta.txt".to_string(),
            data: "größe=1×2".as_bytes().to_vec(),
        }),
    )
    .unwrap();
    recv_reply(&rx);

    host.submit(
        2,
        Command::ReadFile(ReadFilePayload {
            path: "/meta.txt".to_string(),
            encoding: Encoding::Utf8,
        }),
    )
    .unwrap();
    let reply = recv_reply(&rx);
    assert!(!reply.transfer);
    assert_eq!(
        reply.body,
        ReplyBody::File(FileData::Text("größe=1×2".to_string()))
    );
}

#[test]
fn created_directory_appears_in_parent_listing() {
    let (host, rx) = loaded_host();

    host.submit(
        1,
        Command::CreateDir(PathPayload {
            path: "/work".to_string(),
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).body, ReplyBody::Done);

    host.submit(
        2,
        Command::ListDir(PathPayload {
            path: "/".to_string(),
        }),
    )
    .unwrap();
    let ReplyBody::Listing { entries } = recv_reply(&rx).body else {
        panic!("expected a listing");
    };
    assert_eq!(&entries[..2], [".".to_string(), "..".to_string()]);
    assert!(entries.contains(&"work".to_string()));
}

#[test]
fn rename_and_delete_flow() {
    let (host, rx) = loaded_host();

    host.submit(
        1,
        Command::WriteFile(WriteFilePayload {
            path: "/a.bin".to_string(),
            data: vec![9, 9],
        }),
    )
    .unwrap();
    recv_reply(&rx);

    host.submit(
        2,
        Command::Rename(RenamePayload {
            old_path: "/a.bin".to_string(),
            new_path: "/b.bin".to_string(),
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).body, ReplyBody::Done);

    // The old path is gone.
    host.submit(
        3,
        Command::ReadFile(ReadFilePayload {
            path: "/a.bin".to_string(),
            encoding: Encoding::Binary,
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).kind, kind::ERROR);

    host.submit(
        4,
        Command::DeleteFile(PathPayload {
            path: "/b.bin".to_string(),
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).body, ReplyBody::Done);
}

#[test]
fn delete_dir_only_removes_empty_directories() {
    let (host, rx) = loaded_host();

    host.submit(
        1,
        Command::CreateDir(PathPayload {
            path: "/out".to_string(),
        }),
    )
    .unwrap();
    recv_reply(&rx);
    host.submit(
        2,
        Command::WriteFile(WriteFilePayload {
            path: "/out/frame.bin".to_string(),
            data: vec![1],
        }),
    )
    .unwrap();
    recv_reply(&rx);

    host.submit(
        3,
        Command::DeleteDir(PathPayload {
            path: "/out".to_string(),
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).kind, kind::ERROR);

    host.submit(
        4,
        Command::DeleteFile(PathPayload {
            path: "/out/frame.bin".to_string(),
        }),
    )
    .unwrap();
    recv_reply(&rx);
    host.submit(
        5,
        Command::DeleteDir(PathPayload {
            path: "/out".to_string(),
        }),
    )
    .unwrap();
    assert_eq!(recv_reply(&rx).body, ReplyBody::Done);
}

#[test]
fn filesystem_errors_surface_engine_descriptions() {
    let (host, rx) = loaded_host();

    host.submit(
        1,
        Command::ReadFile(ReadFilePayload {
            path: "/missing.bin".to_string(),
            encoding: Encoding::Binary,
        }),
    )
    .unwrap();
    let reply = recv_reply(&rx);
    assert_eq!(reply.id, 1);
    let ReplyBody::Error { message } = reply.body else {
        panic!("expected an error body");
    };
    assert!(message.contains("readFile"));
    assert!(message.contains("/missing.bin"));
}

#[test]
fn binary_reply_envelope_encodes_bytes() {
    let reply = Reply {
        id: 3,
        kind: kind::READ_FILE,
        body: ReplyBody::File(FileData::Binary(vec![0, 128, 255])),
        transfer: true,
    };
    let envelope = Outbound::Reply(reply).to_envelope();
    assert_eq!(envelope.id, Some(3));
    assert_eq!(envelope.data, serde_json::json!([0, 128, 255]));
}
