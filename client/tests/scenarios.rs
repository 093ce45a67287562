//! End-to-end cache-coherence scenarios (SPEC_FULL.md §8), driven against a
//! real `axum` server spawned in-process — the same integration style as
//! `server/tests/endpoints.rs`, but exercised through `CacheManager` rather
//! than raw RPC calls, since these properties only hold across the
//! download/upload transfer protocol the manager owns.

use std::sync::Arc;
use std::time::Duration;

use client::cache::CacheManager;
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

    /// A fresh `CacheManager` against this server, standing in for one
    /// client process with its own cache directory.
    fn client(&self, cache_interval: Duration) -> (CacheManager, tempfile::TempDir) {
        let cache_dir = tempfile::tempdir().unwrap();
        let manager =
            CacheManager::new(cache_dir.path().to_path_buf(), cache_interval, self.base_url.clone());
        (manager, cache_dir)
    }
}

/// S1: single-client write then read, served fresh to a second client.
#[tokio::test]
async fn s1_single_client_write_then_read() {
    let server = TestServer::spawn().await;
    let (writer, _w_dir) = server.client(Duration::from_secs(3));
    let (reader, _r_dir) = server.client(Duration::from_secs(3));

    writer.mknod("/a", 0o100644, 0).await.unwrap();
    writer.open("/a", libc::O_RDWR).await.unwrap();
    writer.write("/a", b"hello", 0).await.unwrap();
    writer.release("/a").await.unwrap();

    reader.open("/a", libc::O_RDONLY).await.unwrap();
    let data = reader.read("/a", 5, 0).await.unwrap();
    assert_eq!(&data, b"hello");
    reader.release("/a").await.unwrap();
}

/// S2: a write-mode open is refused fleet-wide while another client holds
/// one, and succeeds again once that client releases.
#[tokio::test]
async fn s2_write_lockout() {
    let server = TestServer::spawn().await;
    let (a, _a_dir) = server.client(Duration::from_secs(5));
    let (b, _b_dir) = server.client(Duration::from_secs(5));

    a.mknod("/b", 0o100644, 0).await.unwrap();
    a.open("/b", libc::O_RDWR).await.unwrap();

    let err = b.open("/b", libc::O_RDWR).await.unwrap_err();
    assert_eq!(err.to_errno(), -libc::EACCES);

    a.release("/b").await.unwrap();

    b.open("/b", libc::O_RDWR).await.unwrap();
    b.release("/b").await.unwrap();
}

/// S3: within the cache interval a stale server write is invisible; once
/// the window elapses the next read revalidates and downloads the change.
#[tokio::test]
async fn s3_freshness_window_expires_and_revalidates() {
    let server = TestServer::spawn().await;
    let window = Duration::from_millis(300);
    let (writer, _w_dir) = server.client(window);
    let (reader, _r_dir) = server.client(window);

    writer.mknod("/c", 0o100644, 0).await.unwrap();
    writer.open("/c", libc::O_RDWR).await.unwrap();
    writer.write("/c", b"hello", 0).await.unwrap();
    writer.release("/c").await.unwrap();

    reader.open("/c", libc::O_RDONLY).await.unwrap();
    let first = reader.read("/c", 5, 0).await.unwrap();
    assert_eq!(&first, b"hello");

    // Let enough real time pass that the next upload's mtime second is
    // strictly greater than this one's, regardless of where in the current
    // second we started.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (writer2, _w2_dir) = server.client(window);
    writer2.open("/c", libc::O_RDWR).await.unwrap();
    writer2.write("/c", b"world!", 0).await.unwrap();
    writer2.release("/c").await.unwrap();

    // The reader's window (300ms) has long since elapsed, so this read must
    // revalidate against the server and see the new bytes.
    let second = reader.read("/c", 6, 0).await.unwrap();
    assert_eq!(&second, b"world!");
    reader.release("/c").await.unwrap();
}

/// S4: a buffer much larger than the RPC chunk ceiling round-trips exactly,
/// forcing the chunked bulk-transfer loop to run more than one iteration.
#[tokio::test]
async fn s4_chunked_transfer_round_trips_past_the_chunk_ceiling() {
    assert!(9000usize > remote_fs_common::MAX_ARRAY_LEN, "test buffer must force chunking");

    let server = TestServer::spawn().await;
    let (client, _dir) = server.client(Duration::from_secs(30));

    let pattern: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();

    client.mknod("/d", 0o100644, 0).await.unwrap();
    client.open("/d", libc::O_RDWR).await.unwrap();
    let written = client.write("/d", &pattern, 0).await.unwrap();
    assert_eq!(written, pattern.len());
    client.release("/d").await.unwrap();

    client.open("/d", libc::O_RDONLY).await.unwrap();
    let read_back = client.read("/d", pattern.len() as u32, 0).await.unwrap();
    assert_eq!(read_back, pattern);
    client.release("/d").await.unwrap();
}

/// S5: a read past end-of-file returns exactly the bytes the file has.
#[tokio::test]
async fn s5_short_read_at_end_of_file() {
    let server = TestServer::spawn().await;
    let (client, _dir) = server.client(Duration::from_secs(30));

    let content = vec![7u8; 500];
    client.mknod("/e", 0o100644, 0).await.unwrap();
    client.open("/e", libc::O_RDWR).await.unwrap();
    client.write("/e", &content, 0).await.unwrap();
    client.release("/e").await.unwrap();

    client.open("/e", libc::O_RDONLY).await.unwrap();
    let data = client.read("/e", 2048, 0).await.unwrap();
    assert_eq!(data.len(), 500);
    assert_eq!(data, content);
    client.release("/e").await.unwrap();
}

/// S6: `getattr` on a path with no prior open performs a transient
/// open-read-release cycle and leaves no handle behind.
#[tokio::test]
async fn s6_transient_getattr_leaves_no_handle() {
    let server = TestServer::spawn().await;
    let (client, _dir) = server.client(Duration::from_secs(30));

    client.mknod("/f", 0o100644, 0).await.unwrap();
    writer_puts_bytes(&client, "/f", b"12345").await;

    assert_eq!(client.open_count(), 0);
    let stat = client.getattr("/f").await.unwrap();
    assert_eq!(stat.size, 5);
    assert_eq!(client.open_count(), 0);
}

async fn writer_puts_bytes(client: &CacheManager, path: &str, data: &[u8]) {
    client.open(path, libc::O_RDWR).await.unwrap();
    client.write(path, data, 0).await.unwrap();
    client.release(path).await.unwrap();
}
