use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use calc_queue_api::{create_router, ApiConfig};
use calc_queue_backend::MemoryBackend;
use calc_queue_broker::{Broker, BrokerConfig};
use calc_queue_worker::{FanOutConfig, TaskHandlerRegistry, Worker, WorkerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

struct Cluster {
    app: Router,
    broker: Arc<Broker>,
    worker: Worker,
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.worker.shutdown();
        self.broker.shutdown();
    }
}

async fn start_cluster() -> Cluster {
    let broker = Arc::new(
        Broker::with_backend(BrokerConfig::default(), Arc::new(MemoryBackend::new())).unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_address = listener.local_addr().unwrap().to_string();
    tokio::spawn(broker.clone().serve(listener));

    let worker = Worker::new(
        WorkerConfig {
            broker_address: broker_address.clone(),
            worker_id: Some("e2e-worker".to_string()),
            poll_interval_ms: 10,
            graceful_shutdown_timeout_secs: 1,
            ..WorkerConfig::default()
        },
        TaskHandlerRegistry::with_defaults(FanOutConfig { pool_size: 4 }),
    );
    let running = worker.clone();
    tokio::spawn(async move { running.run().await });

    let app = create_router(&ApiConfig {
        broker_address,
        poll_interval_ms: 10,
        ..ApiConfig::default()
    });

    Cluster { app, broker, worker }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "calc.test:5000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "calc.test:5000")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simple_task_returns_sum() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        post("/start_simple_task", json!({"duration": 0, "a": 10, "b": 2})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["result"], json!(12.0));
    assert_eq!(body["full_traceback"], Value::Null);

    let task_id = body["task_id"].as_str().unwrap();
    assert_eq!(
        body["url"],
        json!(format!("http://calc.test:5000/status/{}", task_id))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_task_returns_every_operation() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        post("/start_parallel_task", json!({"duration": 0, "a": 10, "b": 2})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(
        body["result"],
        json!({
            "add": 12.0,
            "sub": 8.0,
            "mul": 20.0,
            "div": 5.0,
            "pow": 100.0,
            "mod": 0.0,
            "fdiv": 5.0
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_task_with_zero_divisor_fails() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        post("/start_parallel_task", json!({"duration": 0, "a": 5, "b": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILURE");
    assert_eq!(body["result"], Value::Null);
    assert_eq!(body["full_traceback"]["classification"], "DivisionByZero");
    assert_eq!(body["full_traceback"]["operation"], "div");

    let task_id = body["task_id"].as_str().unwrap().to_string();
    let (_, result) = send(&cluster.app, get(&format!("/result/{}", task_id))).await;
    assert_eq!(result, json!({"result": "FAILURE"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn longest_wait_still_returns_result() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        post(
            "/start_simple_task",
            json!({"duration": 0, "a": 10, "b": 2, "wait": u64::MAX}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["result"], json!(12.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_wait_returns_current_state() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        post(
            "/start_simple_task",
            json!({"duration": 1, "a": 10, "b": 2, "wait": 0}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["status"] == "PENDING" || body["status"] == "STARTED");
    assert_eq!(body["result"], Value::Null);

    let task_id = body["task_id"].as_str().unwrap().to_string();
    let status_uri = format!("/status/{}", task_id);

    let mut finished = None;
    for _ in 0..100 {
        let (_, body) = send(&cluster.app, get(&status_uri)).await;
        if body["status"] == "SUCCESS" {
            finished = Some(body);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let finished = finished.expect("task did not finish");
    assert_eq!(finished["result"], json!(12.0));

    // A finished task reads the same every time
    let (_, again) = send(&cluster.app, get(&status_uri)).await;
    assert_eq!(again, finished);

    let (_, result) = send(&cluster.app, get(&format!("/result/{}", task_id))).await;
    assert_eq!(result, json!({"result": 12.0}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_task_result() {
    let cluster = start_cluster().await;

    let (status, body) = send(
        &cluster.app,
        get(&format!("/result/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "UNKNOWN"}));

    let (_, body) = send(&cluster.app, get("/result/not-a-task-id")).await;
    assert_eq!(body, json!({"result": "UNKNOWN"}));

    let (status, body) = send(
        &cluster.app,
        get(&format!("/status/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UNKNOWN");
    assert_eq!(body["result"], Value::Null);

    let (status, body) = send(&cluster.app, get("/status/not-a-task-id")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "UNKNOWN",
            "result": null,
            "task_id": "not-a-task-id",
            "full_traceback": null,
            "url": "http://calc.test:5000/status/not-a-task-id"
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn health_check() {
    let cluster = start_cluster().await;

    let (status, body) = send(&cluster.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));
}

#[tokio::test]
async fn unreachable_broker_is_service_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let app = create_router(&ApiConfig {
        broker_address,
        ..ApiConfig::default()
    });

    let (status, body) = send(
        &app,
        post("/start_simple_task", json!({"duration": 0, "a": 1, "b": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}
