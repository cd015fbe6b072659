#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::put;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use imgwatch::error::RuntimeError;
use imgwatch::runtime::EventStream;
use imgwatch::{Connector, EventFilter, ImageInspection, Runtime, RuntimeEvent};

/// In-process stand-in for the catalog service.
pub struct Catalog {
    scripts: Mutex<HashMap<String, VecDeque<StatusCode>>>,
    fallback: StatusCode,
    requests: Mutex<Vec<(Instant, Option<String>, Value)>>,
}

impl Catalog {
    /// Every request for `id` is answered with the next scripted status,
    /// then with `fallback` once the script runs out.
    pub fn script(&self, id: &str, statuses: &[u16]) {
        let statuses = statuses
            .iter()
            .map(|code| StatusCode::from_u16(*code).unwrap())
            .collect();
        self.scripts.lock().unwrap().insert(id.to_string(), statuses);
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, body)| body.clone())
            .collect()
    }

    pub fn content_types(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, content_type, _)| content_type.clone())
            .collect()
    }

    /// When each request reached the catalog, in arrival order.
    pub fn arrivals(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(arrived, _, _)| *arrived)
            .collect()
    }

    pub fn requests_for(&self, id: &str) -> usize {
        self.requests()
            .iter()
            .filter(|body| body["id"] == id)
            .count()
    }
}

async fn put_image(
    State(catalog): State<Arc<Catalog>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let arrived = Instant::now();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let id = body["id"].as_str().unwrap_or_default().to_string();
    catalog
        .requests
        .lock()
        .unwrap()
        .push((arrived, content_type, body));

    catalog
        .scripts
        .lock()
        .unwrap()
        .get_mut(&id)
        .and_then(|statuses| statuses.pop_front())
        .unwrap_or(catalog.fallback)
}

/// Starts a catalog on a random port and returns its base url.
pub async fn start_catalog(fallback: u16) -> (Arc<Catalog>, String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let catalog = Arc::new(Catalog {
        scripts: Mutex::new(HashMap::new()),
        fallback: StatusCode::from_u16(fallback).unwrap(),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/images", put(put_image))
        .with_state(Arc::clone(&catalog));

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (catalog, format!("http://127.0.0.1:{}", port), server)
}

#[derive(Default)]
struct Shared {
    inspections: Mutex<HashMap<String, ImageInspection>>,
    subscriptions: Mutex<VecDeque<Subscription>>,
    failing_connects: AtomicUsize,
    connects: AtomicUsize,
    subscribes: AtomicUsize,
}

type Subscription = UnboundedReceiverStream<Result<RuntimeEvent, RuntimeError>>;

/// Scripted runtime. Each subscription is fed through a channel handed out
/// by [`FakeConnector::subscription`]; dropping the sender ends the stream.
#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<Shared>,
}

impl FakeConnector {
    pub fn with_image(self, name: &str, repo_tags: &[&str], repo_digests: &[&str]) -> Self {
        let inspection = ImageInspection {
            repo_tags: repo_tags.iter().map(|s| s.to_string()).collect(),
            repo_digests: repo_digests.iter().map(|s| s.to_string()).collect(),
        };
        self.shared
            .inspections
            .lock()
            .unwrap()
            .insert(name.to_string(), inspection);
        self
    }

    /// The next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Queues a subscription and returns its feeding end.
    pub fn subscription(&self) -> UnboundedSender<Result<RuntimeEvent, RuntimeError>> {
        let (tx, rx) = unbounded_channel();
        self.shared
            .subscriptions
            .lock()
            .unwrap()
            .push_back(UnboundedReceiverStream::new(rx));
        tx
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.shared.subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Runtime = FakeRuntime;

    async fn connect(&self) -> Result<FakeRuntime, RuntimeError> {
        let failing = self.shared.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.shared
                .failing_connects
                .store(failing - 1, Ordering::SeqCst);
            return Err(RuntimeError::Unavailable("connection refused".to_string()));
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeRuntime {
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct FakeRuntime {
    shared: Arc<Shared>,
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn inspect_image(&self, name: &str) -> Result<ImageInspection, RuntimeError> {
        self.shared
            .inspections
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Unavailable(format!("no such image: {}", name)))
    }

    fn events(&self, filter: &EventFilter) -> EventStream {
        assert_eq!(filter, &EventFilter::images());
        self.shared.subscribes.fetch_add(1, Ordering::SeqCst);

        match self.shared.subscriptions.lock().unwrap().pop_front() {
            Some(stream) => stream.boxed(),
            // no more scripted subscriptions: stay idle
            None => futures::stream::pending::<Result<RuntimeEvent, RuntimeError>>().boxed(),
        }
    }
}

pub fn push(image: &str) -> Result<RuntimeEvent, RuntimeError> {
    Ok(RuntimeEvent::new("image", "push", image))
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
