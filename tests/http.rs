use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct TimerState {
    is_early: bool,
    elapsed_seconds: i64,
    remaining_seconds: i64,
}

#[derive(Debug, Deserialize)]
struct StatsSnapshot {
    today_count: usize,
    total_logged: usize,
    timer: TimerState,
}

#[derive(Debug, Deserialize)]
struct LogResponse {
    stats: StatsSnapshot,
}

#[derive(Debug, Deserialize)]
struct ShareCodeResponse {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RestoreResponse {
    restored: bool,
    stats: StatsSnapshot,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("smokefree_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let data_path = unique_data_path();
    let child = Command::new(env!("CARGO_BIN_EXE_smokefree_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("APP_STORE", "file")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn get_stats(client: &Client, base_url: &str) -> StatsSnapshot {
    client
        .get(format!("{base_url}/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn get_state(client: &Client, base_url: &str) -> serde_json::Value {
    client
        .get(format!("{base_url}/api/state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_log_cigarette_updates_today() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = get_stats(&client, &server.base_url).await;

    let response = client
        .post(format!("{}/api/cigarettes", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let logged: LogResponse = response.json().await.unwrap();

    assert_eq!(logged.stats.today_count, before.today_count + 1);
    assert_eq!(logged.stats.total_logged, before.total_logged + 1);
    assert!(logged.stats.timer.is_early);
    assert!(logged.stats.timer.remaining_seconds > 0);

    let timer: TimerState = client
        .get(format!("{}/api/timer", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(timer.elapsed_seconds < 60);
}

#[tokio::test]
async fn http_restore_rejects_bad_codes() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = get_state(&client, &server.base_url).await;

    let empty = client
        .post(format!("{}/api/restore", server.base_url))
        .json(&serde_json::json!({ "code": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.text().await.unwrap(), "enter a code");

    let garbage = client
        .post(format!("{}/api/restore", server.base_url))
        .json(&serde_json::json!({ "code": "%%% not a code %%%" }))
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    assert_eq!(garbage.text().await.unwrap(), "invalid or corrupted code");

    let after = get_state(&client, &server.base_url).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn http_share_code_restores_same_log() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    client
        .post(format!("{}/api/cigarettes", server.base_url))
        .send()
        .await
        .unwrap();
    let before = get_stats(&client, &server.base_url).await;

    let share: ShareCodeResponse = client
        .get(format!("{}/api/share-code", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!share.code.is_empty());

    let restored: RestoreResponse = client
        .post(format!("{}/api/restore", server.base_url))
        .json(&serde_json::json!({ "code": share.code }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(restored.restored);
    assert_eq!(restored.stats.total_logged, before.total_logged);
    assert_eq!(restored.stats.today_count, before.today_count);
}

#[tokio::test]
async fn http_settings_are_validated() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let rejected = client
        .put(format!("{}/api/settings", server.base_url))
        .json(&serde_json::json!({ "dailyLimit": 99999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let accepted: serde_json::Value = client
        .put(format!("{}/api/settings", server.base_url))
        .json(&serde_json::json!({ "dailyLimit": 12, "currency": "EUR" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(accepted["dailyLimit"], 12.0);
    assert_eq!(accepted["currency"], "EUR");
}

#[tokio::test]
async fn http_cravings_can_be_listed_and_deleted() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let logged: serde_json::Value = client
        .post(format!("{}/api/cravings", server.base_url))
        .json(&serde_json::json!({ "trigger": " Boredom ", "notes": "after lunch" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logged["trigger"], "Boredom");
    let at = chrono::DateTime::parse_from_rfc3339(logged["timestamp"].as_str().unwrap())
        .unwrap()
        .timestamp_millis();

    let listed: serde_json::Value = client
        .get(format!("{}/api/cravings", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = listed["entries"].as_array().unwrap();
    assert!(entries.iter().any(|entry| entry["notes"] == "after lunch"));

    let deleted = client
        .delete(format!("{}/api/cravings/{at}", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(deleted.status().is_success());

    let missing = client
        .delete(format!("{}/api/cravings/{at}", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
