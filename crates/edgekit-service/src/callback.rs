//! Metadata callback handler.
//!
//! Metadata notifies the service of device additions, updates and removals
//! through the callback channel registered in its addressable. Add and
//! update fetch the device record back from metadata so the map always
//! holds a resolved profile.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde::Deserialize;

use crate::http::{HandlerRequest, HandlerResponse, RouteHandler};
use crate::service::ServiceInner;

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
}

pub(crate) struct CallbackHandler {
    inner: Arc<ServiceInner>,
}

impl CallbackHandler {
    pub fn new(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }

    async fn upsert(&self, id: &str) -> HandlerResponse {
        let Some(metadata) = self.inner.metadata_client() else {
            return HandlerResponse::text(
                StatusCode::SERVICE_UNAVAILABLE,
                "metadata client unavailable",
            );
        };
        match metadata.device(id).await {
            Ok(Some(device)) => {
                if let Some(old) = self.inner.devices.get_by_id(id).await {
                    self.inner.remove_autoevents(&old);
                }
                let device = self.inner.devices.insert(device).await;
                self.inner.register_autoevents(&device);
                tracing::info!("Callback: device {} added/updated", device.name);
                HandlerResponse::ok_text("ok")
            }
            Ok(None) => HandlerResponse::text(StatusCode::NOT_FOUND, "no such device"),
            Err(e) => {
                tracing::error!("Callback: device fetch failed: {}", e);
                HandlerResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "metadata error")
            }
        }
    }

    async fn remove(&self, id: &str) -> HandlerResponse {
        match self.inner.devices.remove_by_id(id).await {
            Some(device) => {
                self.inner.remove_autoevents(&device);
                tracing::info!("Callback: device {} removed", device.name);
                HandlerResponse::ok_text("ok")
            }
            None => HandlerResponse::text(StatusCode::NOT_FOUND, "no such device"),
        }
    }
}

#[async_trait]
impl RouteHandler for CallbackHandler {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        let Ok(payload) = serde_json::from_slice::<CallbackPayload>(&request.body) else {
            return HandlerResponse::text(StatusCode::BAD_REQUEST, "bad callback payload");
        };
        if !payload.kind.eq_ignore_ascii_case("device") {
            tracing::debug!("Callback: ignoring {} notification", payload.kind);
            return HandlerResponse::ok_text("ignored");
        }

        if request.method == Method::POST || request.method == Method::PUT {
            self.upsert(&payload.id).await
        } else if request.method == Method::DELETE {
            self.remove(&payload.id).await
        } else {
            HandlerResponse::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
    }
}
