// tests/integration/fixtures.rs

//! Shared fixtures: a stub origin server, a stub control plane, and a fully
//! wired edge instance listening on an ephemeral port.

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use opaledge::config::Config;
use opaledge::core::cache::CacheStore;
use opaledge::core::cache::memory::MemoryCache;
use opaledge::core::control::{
    ControlPlaneClient, DomainConfig, EdgeIdentity, PurgeTask, RegisterRequest,
};
use opaledge::core::rate_limit::RateLimiter;
use opaledge::core::state::{EdgeState, EdgeStats};
use opaledge::server::router::build_router;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ===== Stub origin =====

#[derive(Default)]
pub struct OriginState {
    hits: Mutex<HashMap<String, usize>>,
}

impl OriginState {
    fn record(&self, what: &str) {
        *self.hits.lock().entry(what.to_string()).or_insert(0) += 1;
    }

    /// Number of times the origin served `what`, e.g. `"GET /hello"`.
    pub fn hits(&self, what: &str) -> usize {
        self.hits.lock().get(what).copied().unwrap_or(0)
    }
}

pub struct StubOrigin {
    pub addr: SocketAddr,
    pub state: Arc<OriginState>,
}

pub async fn spawn_origin() -> StubOrigin {
    let state = Arc::new(OriginState::default());
    let app = Router::new()
        .route("/hello", get(hello_get).post(hello_post))
        .route("/no-cache", get(no_cache))
        .route("/error", get(error_route))
        .route("/cookie", get(cookie_route))
        .route("/huge", get(huge))
        .route("/huge-stream", get(huge_stream))
        .route("/echo-headers", get(echo_headers))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    StubOrigin { addr, state }
}

async fn hello_get(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    state.record("GET /hello");
    (
        StatusCode::OK,
        [
            ("content-type", "text/plain"),
            ("cache-control", "public, max-age=3600"),
        ],
        "Hello, World!",
    )
}

async fn hello_post(State(state): State<Arc<OriginState>>, body: String) -> impl IntoResponse {
    state.record("POST /hello");
    (StatusCode::OK, Json(json!({ "received": body })))
}

async fn no_cache(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    state.record("GET /no-cache");
    (
        StatusCode::OK,
        [("cache-control", "no-cache")],
        "Not cacheable",
    )
}

async fn error_route(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    state.record("GET /error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn cookie_route(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    state.record("GET /cookie");
    (
        StatusCode::OK,
        [
            ("set-cookie", "session=abc123"),
            ("cache-control", "public, max-age=3600"),
        ],
        "with cookie",
    )
}

async fn huge(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    state.record("GET /huge");
    (StatusCode::OK, vec![0u8; 64 * 1024])
}

/// A chunked response with no Content-Length, to exercise the mid-read cap.
async fn huge_stream(State(state): State<Arc<OriginState>>) -> Response {
    state.record("GET /huge-stream");
    let chunks =
        (0..64).map(|_| Ok::<_, std::io::Error>(bytes::Bytes::from(vec![0u8; 1024])));
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

/// Echoes the received request headers back as JSON, for assertions about
/// what actually crossed the upstream hop.
async fn echo_headers(
    State(state): State<Arc<OriginState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.record("GET /echo-headers");
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or("<binary>").to_string());
    }
    Json(serde_json::to_value(seen).unwrap())
}

// ===== Stub control plane =====

pub struct ControlState {
    domains: HashMap<String, DomainConfig>,
    purges: Mutex<Vec<PurgeTask>>,
    completed: Mutex<Vec<String>>,
    resolves: Mutex<HashMap<String, usize>>,
    heartbeats: Mutex<usize>,
}

impl ControlState {
    pub fn new(origin_addr: SocketAddr) -> Self {
        let origin_url = format!("http://{origin_addr}");
        let mut domains = HashMap::new();
        domains.insert(
            "test.example.com".to_string(),
            DomainConfig {
                id: "dom-1".to_string(),
                domain: "test.example.com".to_string(),
                origin_url: origin_url.clone(),
                cache_ttl: 300,
                rate_limit: 0,
                status: "active".to_string(),
            },
        );
        domains.insert(
            "inactive.example.com".to_string(),
            DomainConfig {
                id: "dom-2".to_string(),
                domain: "inactive.example.com".to_string(),
                origin_url,
                cache_ttl: 300,
                rate_limit: 0,
                status: "paused".to_string(),
            },
        );
        Self {
            domains,
            purges: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            resolves: Mutex::new(HashMap::new()),
            heartbeats: Mutex::new(0),
        }
    }

    pub fn queue_purge(&self, task: PurgeTask) {
        self.purges.lock().push(task);
    }

    pub fn completed_purges(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    pub fn resolve_count(&self, host: &str) -> usize {
        self.resolves.lock().get(host).copied().unwrap_or(0)
    }

    pub fn heartbeat_count(&self) -> usize {
        *self.heartbeats.lock()
    }
}

async fn cp_register() -> impl IntoResponse {
    Json(EdgeIdentity {
        id: "edge-test-1".to_string(),
        region: "test".to_string(),
        status: "active".to_string(),
    })
}

async fn cp_heartbeat(
    State(state): State<Arc<ControlState>>,
    Path(_edge_id): Path<String>,
) -> impl IntoResponse {
    *state.heartbeats.lock() += 1;
    StatusCode::NO_CONTENT
}

async fn cp_resolve(
    State(state): State<Arc<ControlState>>,
    Path(host): Path<String>,
) -> Response {
    *state.resolves.lock().entry(host.clone()).or_insert(0) += 1;
    match state.domains.get(&host) {
        Some(config) => Json(config.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cp_resolve_by_id(
    State(state): State<Arc<ControlState>>,
    Path(domain_id): Path<String>,
) -> Response {
    match state.domains.values().find(|config| config.id == domain_id) {
        Some(config) => Json(config.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cp_purges(
    State(state): State<Arc<ControlState>>,
    Path(_edge_id): Path<String>,
) -> impl IntoResponse {
    Json(json!({ "purges": state.purges.lock().clone() }))
}

async fn cp_complete(
    State(state): State<Arc<ControlState>>,
    Path((_edge_id, purge_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state.purges.lock().retain(|task| task.id != purge_id);
    state.completed.lock().push(purge_id);
    StatusCode::OK
}

pub async fn spawn_control(state: Arc<ControlState>) -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/edges", post(cp_register))
        .route("/api/v1/edges/{edge_id}/heartbeat", post(cp_heartbeat))
        .route("/api/v1/edges/{edge_id}/purges", get(cp_purges))
        .route(
            "/api/v1/edges/{edge_id}/purges/{purge_id}/complete",
            post(cp_complete),
        )
        .route("/v1/domains/{host}", get(cp_resolve))
        .route("/v1/domains/id/{domain_id}", get(cp_resolve_by_id))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ===== The edge under test =====

pub struct EdgeHarness {
    pub edge_addr: SocketAddr,
    pub state: Arc<EdgeState>,
    pub origin: Arc<OriginState>,
    pub control: Arc<ControlState>,
    pub client: reqwest::Client,
}

impl EdgeHarness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds a full edge (registered against the stub control plane, backed
    /// by the in-memory cache) and serves it on an ephemeral port.
    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let origin = spawn_origin().await;
        let control_state = Arc::new(ControlState::new(origin.addr));
        let control_addr = spawn_control(control_state.clone()).await;

        let mut config = Config::default();
        // Generous limits by default so individual tests opt in to limiting.
        config.rate_limit_rps = 1000;
        config.rate_limit_burst = 1000;
        config.control_plane_url = format!("http://{control_addr}");
        customize(&mut config);

        let control =
            ControlPlaneClient::new(&config.control_plane_url, Duration::from_secs(5)).unwrap();
        let register = RegisterRequest {
            region: config.region.clone(),
            ip_address: "127.0.0.1".to_string(),
            hostname: "edge-test".to_string(),
            capacity: config.capacity,
        };
        let identity = control.register(&register).await.unwrap();

        let cache = CacheStore::Memory(MemoryCache::new(config.cache_size, config.max_body_bytes));
        let limiter = RateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);
        let origin_client = EdgeState::build_origin_client(&config).unwrap();

        let state = Arc::new(EdgeState {
            config,
            cache,
            limiter,
            control,
            origin_client,
            identity,
            stats: EdgeStats::new(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let edge_addr = listener.local_addr().unwrap();
        let app = build_router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            edge_addr,
            state,
            origin: origin.state,
            control: control_state,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.edge_addr, path)
    }

    /// Issues a GET through the edge with the given `Host` header.
    pub async fn get(&self, path: &str, host: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(reqwest::header::HOST, host)
            .send()
            .await
            .expect("edge request failed")
    }
}
