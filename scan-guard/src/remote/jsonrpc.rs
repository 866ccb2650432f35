//! JSON-RPC client for the ERP `call_kw` endpoint

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};
use shared::picking::{
    LogEntry, OfflineScan, OfflineSyncResponse, PickingId, SnapshotResponse, StrictScanRequest,
    StrictScanResponse,
};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{PickingBackend, RemoteError, RemoteResult};
use crate::config::GuardConfig;

const MODEL: &str = "stock.picking";

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

impl RpcError {
    /// The user-facing message lives in `data.message` for server-raised errors
    fn into_message(self) -> String {
        self.data
            .and_then(|d| d.message)
            .or(self.message)
            .unwrap_or_else(|| "Unknown server error".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// HTTP JSON-RPC backend
#[derive(Debug)]
pub struct JsonRpcBackend {
    client: Client,
    base_url: String,
    next_id: AtomicU64,
}

impl JsonRpcBackend {
    /// Build from configuration
    ///
    /// The HTTP client timeout mirrors the guard's remote timeout.
    pub fn new(config: &GuardConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(config.remote_timeout())
            .build()
            .map_err(|e| RemoteError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    fn map_transport(e: reqwest::Error) -> RemoteError {
        if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }

    fn request_body(&self, method: &str, args: Value, kwargs: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "call",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "params": {
                "model": MODEL,
                "method": method,
                "args": args,
                "kwargs": kwargs,
            },
        })
    }

    /// `POST /web/dataset/call_kw/stock.picking/<method>`
    async fn call_kw<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> RemoteResult<T> {
        let url = format!("{}/web/dataset/call_kw/{MODEL}/{method}", self.base_url);
        let body = self.request_body(method, args, kwargs);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                s if s.is_server_error() => RemoteError::Network(format!("{s}: {text}")),
                StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                    RemoteError::Network(format!("{status}: {text}"))
                }
                _ => RemoteError::Server(format!("{status}: {text}")),
            });
        }

        let envelope: RpcEnvelope = response.json().await.map_err(Self::map_transport)?;
        if let Some(error) = envelope.error {
            return Err(RemoteError::Server(error.into_message()));
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RemoteError::InvalidResponse(format!("{method}: {e}")))
    }
}

#[async_trait]
impl PickingBackend for JsonRpcBackend {
    async fn fetch_snapshot(&self, picking_id: PickingId) -> RemoteResult<SnapshotResponse> {
        self.call_kw("get_picking_snapshot", json!([picking_id]), json!({}))
            .await
    }

    async fn submit_strict_scan(
        &self,
        request: &StrictScanRequest,
    ) -> RemoteResult<StrictScanResponse> {
        self.call_kw(
            "action_scan_product_strict",
            json!([
                request.picking_id,
                request.barcode,
                request.location_id,
                request.lot_id
            ]),
            json!({ "scan_id": request.scan_id }),
        )
        .await
    }

    async fn submit_offline_scans(
        &self,
        picking_id: PickingId,
        scans: &[OfflineScan],
    ) -> RemoteResult<OfflineSyncResponse> {
        self.call_kw("process_offline_scans", json!([picking_id, scans]), json!({}))
            .await
    }

    async fn submit_offline_logs(
        &self,
        picking_id: PickingId,
        logs: &[LogEntry],
    ) -> RemoteResult<bool> {
        // Any truthy result counts as success
        let result: Value = self
            .call_kw("action_sync_logs", json!([picking_id, logs]), json!({}))
            .await?;
        Ok(is_truthy(&result))
    }

    async fn log_scan_event(&self, barcode: &str, status: &str, message: &str) -> RemoteResult<()> {
        let _: Value = self
            .call_kw(
                "action_log_scan_event",
                json!([barcode, status, message]),
                json!({}),
            )
            .await?;
        Ok(())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
