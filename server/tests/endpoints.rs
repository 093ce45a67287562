use std::sync::Arc;

use remote_fs_common::proto::{
    GetattrRequest, GetattrResponse, LockRequest, LockResponse, MknodRequest, MknodResponse,
    OpenRequest, OpenResponse, ReadRequest, ReadResponse, ReleaseRequest, ReleaseResponse,
    UnlockRequest, UnlockResponse, WriteRequest, WriteResponse,
};
use remote_fs_common::wire::{LockMode, OpenRecord};
use server::state::ServerState;

struct TestServer {
    base_url: String,
    _persist_dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(ServerState::new(dir.path().to_path_buf()));
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer { base_url: format!("http://{}", addr), _persist_dir: dir }
    }

    async fn call<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        procedure: &str,
        req: &Req,
    ) -> Resp {
        let body = bincode::serialize(req).unwrap();
        let resp = reqwest::Client::new()
            .post(format!("{}/rpc/{}", self.base_url, procedure))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let bytes = resp.bytes().await.unwrap();
        bincode::deserialize(&bytes).unwrap()
    }
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let server = TestServer::spawn().await;
    let resp = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn getattr_on_missing_path_returns_negative_errno() {
    let server = TestServer::spawn().await;
    let resp: GetattrResponse =
        server.call("getattr", &GetattrRequest { path: "/nope.txt".into() }).await;
    assert!(resp.status < 0);
    assert!(resp.stat.is_none());
}

#[tokio::test]
async fn mknod_then_getattr_sees_the_new_file() {
    let server = TestServer::spawn().await;

    let created: MknodResponse =
        server.call("mknod", &MknodRequest { path: "/a.txt".into(), mode: 0o100644, dev: 0 }).await;
    assert_eq!(created.status, 0);

    let stat: GetattrResponse =
        server.call("getattr", &GetattrRequest { path: "/a.txt".into() }).await;
    assert_eq!(stat.status, 0);
    assert_eq!(stat.stat.unwrap().size, 0);
}

#[tokio::test]
async fn write_then_read_round_trips_through_open_handles() {
    let server = TestServer::spawn().await;

    let _: MknodResponse =
        server.call("mknod", &MknodRequest { path: "/b.txt".into(), mode: 0o100644, dev: 0 }).await;

    let opened: OpenResponse =
        server.call("open", &OpenRequest { path: "/b.txt".into(), flags: libc::O_RDWR }).await;
    assert_eq!(opened.status, 0);
    let record = opened.record.unwrap();

    let written: WriteResponse = server
        .call(
            "write",
            &WriteRequest { path: "/b.txt".into(), record, data: b"hello".to_vec(), offset: 0 },
        )
        .await;
    assert_eq!(written.status, 5);

    let read: ReadResponse = server
        .call("read", &ReadRequest { path: "/b.txt".into(), record, size: 128, offset: 0 })
        .await;
    assert_eq!(read.status, 5);
    assert_eq!(&read.data, b"hello");

    let released: ReleaseResponse =
        server.call("release", &ReleaseRequest { path: "/b.txt".into(), record }).await;
    assert_eq!(released.status, 0);
}

#[tokio::test]
async fn second_write_open_is_rejected_while_first_is_held() {
    let server = TestServer::spawn().await;
    let _: MknodResponse =
        server.call("mknod", &MknodRequest { path: "/c.txt".into(), mode: 0o100644, dev: 0 }).await;

    let first: OpenResponse =
        server.call("open", &OpenRequest { path: "/c.txt".into(), flags: libc::O_WRONLY }).await;
    assert_eq!(first.status, 0);

    let second: OpenResponse =
        server.call("open", &OpenRequest { path: "/c.txt".into(), flags: libc::O_WRONLY }).await;
    assert_eq!(second.status, -libc::EACCES);

    let record = first.record.unwrap();
    let _: ReleaseResponse =
        server.call("release", &ReleaseRequest { path: "/c.txt".into(), record }).await;

    let third: OpenResponse =
        server.call("open", &OpenRequest { path: "/c.txt".into(), flags: libc::O_WRONLY }).await;
    assert_eq!(third.status, 0);
}

#[tokio::test]
async fn lock_then_unlock_round_trips() {
    let server = TestServer::spawn().await;
    let locked: LockResponse =
        server.call("lock", &LockRequest { path: "/d.txt".into(), mode: LockMode::Write }).await;
    assert_eq!(locked.status, 0);

    let unlocked: UnlockResponse = server
        .call("unlock", &UnlockRequest { path: "/d.txt".into(), mode: LockMode::Write })
        .await;
    assert_eq!(unlocked.status, 0);

    let stray: UnlockResponse = server
        .call("unlock", &UnlockRequest { path: "/d.txt".into(), mode: LockMode::Write })
        .await;
    assert_eq!(stray.status, -1);
}
