use admin_api::{router, AdminState};
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use background_service::{SourceJob, SourceScheduler};
use database::Database;
use relay_core::{
    ConfigId, CoreError, DedupLedger, DeliveryError, RedditApiError, RunOutcome,
    SourceDirectory, SubredditSummary,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BODY_LIMIT: usize = 1024 * 1024;

#[derive(Default)]
struct FakeDirectory {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl SourceDirectory for FakeDirectory {
    async fn search_sources(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SubredditSummary>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RedditApiError::ServerError { status_code: 503 }.into());
        }
        assert_eq!(limit, 10);
        Ok(vec![SubredditSummary {
            name: query.to_string(),
            title: format!("All about {}", query),
            subscribers: Some(1200),
            over18: false,
        }])
    }
}

#[derive(Default)]
struct RecordingJob {
    runs: Mutex<Vec<ConfigId>>,
    busy: Mutex<HashSet<ConfigId>>,
    failing: Mutex<HashSet<ConfigId>>,
}

impl RecordingJob {
    fn runs_for(&self, id: ConfigId) -> usize {
        self.runs.lock().unwrap().iter().filter(|r| **r == id).count()
    }
}

#[async_trait]
impl SourceJob for RecordingJob {
    async fn run_source(&self, config_id: ConfigId) -> Result<RunOutcome, CoreError> {
        if self.busy.lock().unwrap().contains(&config_id) {
            return Err(CoreError::RunInProgress { config_id });
        }
        self.runs.lock().unwrap().push(config_id);
        if self.failing.lock().unwrap().contains(&config_id) {
            return Err(DeliveryError::HttpStatus { status_code: 502 }.into());
        }
        Ok(RunOutcome::Delivered {
            post_id: format!("post{}", config_id),
        })
    }
}

struct TestApp {
    app: Router,
    db: Arc<Database>,
    directory: Arc<FakeDirectory>,
    job: Arc<RecordingJob>,
    scheduler: Arc<SourceScheduler>,
    _dir: TempDir,
}

async fn setup() -> TestApp {
    let dir = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}", dir.path().join("admin.db").display());
    let db = Arc::new(Database::open(db_url).await.expect("open test database"));
    let directory = Arc::new(FakeDirectory::default());
    let job = Arc::new(RecordingJob::default());
    let scheduler = Arc::new(SourceScheduler::new(job.clone()));

    let app = router(AdminState {
        store: db.clone(),
        ledger: db.clone(),
        directory: directory.clone(),
        scheduler: scheduler.clone(),
    });

    TestApp {
        app,
        db,
        directory,
        job,
        scheduler,
        _dir: dir,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create(app: &Router, name: &str, frequency: u32) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/configs",
        Some(json!({"subreddit_name": name, "filter_type": "top_week", "frequency": frequency})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn health_check_responds_ok() {
    let t = setup().await;
    let (status, body) = call(&t.app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn creating_a_config_schedules_it_and_runs_once() {
    let t = setup().await;

    let body = create(&t.app, "r/EarthPorn", 30).await;
    let id = body["id"].as_i64().unwrap();
    assert_eq!(body["subreddit_name"], "EarthPorn");
    assert_eq!(body["filter_type"], "top_week");
    assert_eq!(body["is_active"], true);

    assert_eq!(t.scheduler.interval_of(id), Some(Duration::from_secs(30 * 60)));
    settle().await;
    assert_eq!(t.job.runs_for(id), 1);

    let (status, list) = call(&t.app, "GET", "/api/configs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_configs_are_rejected() {
    let t = setup().await;

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/configs",
        Some(json!({"subreddit_name": "pics", "filter_type": "top_day", "frequency": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, _) = call(
        &t.app,
        "POST",
        "/api/configs",
        Some(json!({"subreddit_name": "not a sub!", "filter_type": "top_day", "frequency": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(t.scheduler.scheduled_count(), 0);
}

#[tokio::test]
async fn updating_an_active_config_reschedules_it() {
    let t = setup().await;
    let id = create(&t.app, "pics", 30).await["id"].as_i64().unwrap();

    let (status, body) = call(
        &t.app,
        "PUT",
        &format!("/api/configs/{}", id),
        Some(json!({"filter_type": "top_month", "frequency": 90})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filter_type"], "top_month");
    assert_eq!(body["frequency"], 90);
    assert_eq!(t.scheduler.interval_of(id), Some(Duration::from_secs(90 * 60)));
    assert_eq!(t.scheduler.scheduled_count(), 1);

    let (status, body) = call(
        &t.app,
        "PUT",
        "/api/configs/999",
        Some(json!({"filter_type": "top_day", "frequency": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn toggling_switches_the_timer_off_and_on() {
    let t = setup().await;
    let id = create(&t.app, "aww", 15).await["id"].as_i64().unwrap();
    settle().await;

    let (status, body) = call(&t.app, "POST", &format!("/api/configs/{}/toggle", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);
    assert!(!t.scheduler.is_scheduled(id));

    let (status, body) = call(&t.app, "POST", &format!("/api/configs/{}/toggle", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);
    assert!(t.scheduler.is_scheduled(id));
    settle().await;
    assert_eq!(t.job.runs_for(id), 2);

    let (status, _) = call(&t.app, "POST", "/api/configs/999/toggle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn single_config_is_fetched_by_id() {
    let t = setup().await;
    let id = create(&t.app, "r/aww", 45).await["id"].as_i64().unwrap();

    let (status, body) = call(&t.app, "GET", &format!("/api/configs/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["subreddit_name"], "aww");
    assert_eq!(body["frequency"], 45);

    let (status, body) = call(&t.app, "GET", "/api/configs/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn deleting_removes_config_and_timer() {
    let t = setup().await;
    let id = create(&t.app, "pics", 30).await["id"].as_i64().unwrap();

    let (status, body) = call(&t.app, "DELETE", &format!("/api/configs/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert!(!t.scheduler.is_scheduled(id));

    let (status, _) = call(&t.app, "DELETE", &format!("/api/configs/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_now_reports_run_results() {
    let t = setup().await;
    let ok = create(&t.app, "pics", 30).await["id"].as_i64().unwrap();
    let busy = create(&t.app, "aww", 30).await["id"].as_i64().unwrap();
    let failing = create(&t.app, "videos", 30).await["id"].as_i64().unwrap();
    let paused = create(&t.app, "gifs", 30).await["id"].as_i64().unwrap();
    settle().await;

    t.job.busy.lock().unwrap().insert(busy);
    t.job.failing.lock().unwrap().insert(failing);
    call(&t.app, "POST", &format!("/api/configs/{}/toggle", paused), None).await;

    let (status, body) = call(&t.app, "POST", &format!("/api/configs/{}/send-now", ok), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "delivered", "post_id": format!("post{}", ok)}));

    let (status, body) =
        call(&t.app, "POST", &format!("/api/configs/{}/send-now", busy), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "RUN_IN_PROGRESS");

    let (status, body) =
        call(&t.app, "POST", &format!("/api/configs/{}/send-now", failing), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DELIVERY");

    let runs_before = t.job.runs_for(paused);
    let (status, _) =
        call(&t.app, "POST", &format!("/api/configs/{}/send-now", paused), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(t.job.runs_for(paused), runs_before);

    let (status, _) = call(&t.app, "POST", "/api/configs/999/send-now", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_passes_through_to_the_directory() {
    let t = setup().await;

    let (status, body) = call(&t.app, "GET", "/api/subreddits/search?q=", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(t.directory.calls.load(Ordering::SeqCst), 0);

    let (status, body) = call(&t.app, "GET", "/api/subreddits/search?q=cats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "cats");
    assert_eq!(body[0]["subscribers"], 1200);

    t.directory.fail.store(true, Ordering::SeqCst);
    let (status, body) = call(&t.app, "GET", "/api/subreddits/search?q=cats", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "REDDIT_SERVER_ERROR");
}

#[tokio::test]
async fn deliveries_are_listed_newest_first() {
    let t = setup().await;
    for post_id in ["first", "second", "third"] {
        t.db.record(post_id, "pics").await.unwrap();
    }

    let (status, body) = call(&t.app, "GET", "/api/deliveries?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["post_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["third", "second"]);

    let (_, body) = call(&t.app, "GET", "/api/deliveries", None).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let t = setup().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/configs")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
