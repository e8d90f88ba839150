//! The REST server hosting the control surface.
//!
//! The server owns a dynamic dispatch table instead of a static route tree:
//! bring-up installs the metadata callback handler first, processes
//! configured devices, initializes the driver and only then installs the
//! remaining handlers. Handlers register under a path or, with a trailing
//! `/`, a path subtree, together with the set of methods they accept.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use edgekit_core::{Error, Result};

/// Largest request body the dispatcher will buffer.
const MAX_BODY_BYTES: usize = 1 << 20;

/// A request as seen by a registered handler.
#[derive(Debug)]
pub struct HandlerRequest {
    pub method: Method,
    /// Full request path.
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// A handler's reply.
#[derive(Debug)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into().into_bytes(),
        }
    }

    pub fn ok_text(body: impl Into<String>) -> Self {
        Self::text(StatusCode::OK, body)
    }

    pub fn json(status: StatusCode, value: &impl serde::Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    pub fn ok_json(value: &impl serde::Serialize) -> Self {
        Self::json(StatusCode::OK, value)
    }
}

/// A registered request handler.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse;
}

struct Route {
    prefix: String,
    methods: Vec<Method>,
    handler: Arc<dyn RouteHandler>,
}

#[derive(Clone)]
struct Dispatch {
    routes: Arc<RwLock<Vec<Route>>>,
}

/// The HTTP server for the control surface.
pub struct RestServer {
    routes: Arc<RwLock<Vec<Route>>>,
    local_addr: SocketAddr,
    shutdown: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl RestServer {
    /// Bind the listening socket and start serving. No handler is
    /// registered yet; unmatched requests answer 404.
    pub async fn create(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| Error::BadConfig(format!("cannot bind HTTP port {port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::BadConfig(format!("cannot resolve bound address: {e}")))?;

        let routes: Arc<RwLock<Vec<Route>>> = Arc::new(RwLock::new(Vec::new()));
        let app = Router::new()
            .fallback(dispatch)
            .with_state(Dispatch {
                routes: routes.clone(),
            });

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        Ok(Self {
            routes,
            local_addr,
            shutdown: std::sync::Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// Register `handler` for `prefix` and the given method set. A prefix
    /// with a trailing `/` matches the whole subtree beneath it.
    pub async fn register_handler(
        &self,
        prefix: &str,
        methods: &[Method],
        handler: Arc<dyn RouteHandler>,
    ) {
        let mut routes = self.routes.write().await;
        routes.retain(|r| r.prefix != prefix);
        routes.push(Route {
            prefix: prefix.to_string(),
            methods: methods.to_vec(),
            handler,
        });
    }

    /// Registered route prefixes, for diagnostics.
    pub async fn registered_paths(&self) -> Vec<String> {
        self.routes
            .read()
            .await
            .iter()
            .map(|r| r.prefix.clone())
            .collect()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections and wait for the serve loop to finish.
    pub async fn stop(&self) {
        if let Ok(mut shutdown) = self.shutdown.lock() {
            if let Some(tx) = shutdown.take() {
                let _ = tx.send(());
            }
        }
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = query {
        for part in query.split('&') {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) => params.insert(key.to_string(), value.to_string()),
                None => params.insert(part.to_string(), String::new()),
            };
        }
    }
    params
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if let Some(base) = prefix.strip_suffix('/') {
        path == base || path.starts_with(prefix)
    } else {
        path == prefix
    }
}

async fn dispatch(State(state): State<Dispatch>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = parse_query(request.uri().query());

    let matched = {
        let routes = state.routes.read().await;
        routes
            .iter()
            .filter(|r| prefix_matches(&r.prefix, &path))
            .max_by_key(|r| r.prefix.len())
            .map(|r| (r.methods.clone(), r.handler.clone()))
    };

    let Some((methods, handler)) = matched else {
        return plain_response(StatusCode::NOT_FOUND, "not found");
    };
    if !methods.contains(&method) {
        return plain_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "body too large"),
    };

    let reply = handler
        .handle(HandlerRequest {
            method,
            path,
            query,
            body,
        })
        .await;

    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = reply.status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(reply.content_type),
    );
    response
}

fn plain_response(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain"),
    );
    response
}
