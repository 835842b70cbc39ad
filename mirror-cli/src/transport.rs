//! Odoo JSON-RPC over HTTP.
//!
//! Every request is a `POST {url}/jsonrpc` carrying
//! `{"jsonrpc": "2.0", "method": "call", "params": {"service", "method", "args"}}`.
//! Login goes through `common.login`; model calls through
//! `object.execute_kw(db, uid, password, model, method, args, kwargs)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use mirror_sync::{Credentials, RpcClient, RpcConnector, RpcError};

/// Opens authenticated sessions; one [`ureq::Agent`] (and its connection
/// pool) is shared by every session it opens.
pub struct JsonRpcConnector {
    agent: ureq::Agent,
    next_id: std::sync::Arc<AtomicU64>,
}

impl JsonRpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            next_id: std::sync::Arc::new(AtomicU64::new(1)),
        }
    }
}

impl RpcConnector for JsonRpcConnector {
    fn login(&self, credentials: &Credentials) -> Result<Box<dyn RpcClient>, RpcError> {
        let endpoint = endpoint(&credentials.url);
        let result = post(
            &self.agent,
            &endpoint,
            self.next_id.fetch_add(1, Ordering::Relaxed),
            "common",
            "login",
            json!([credentials.database, credentials.username, credentials.password]),
        )?;
        let uid = parse_uid(result, &credentials.username)?;
        tracing::debug!("logged in to {endpoint} as uid {uid}");

        Ok(Box::new(JsonRpcSession {
            agent: self.agent.clone(),
            next_id: self.next_id.clone(),
            endpoint,
            database: credentials.database.clone(),
            uid,
            password: credentials.password.clone(),
        }))
    }
}

struct JsonRpcSession {
    agent: ureq::Agent,
    next_id: std::sync::Arc<AtomicU64>,
    endpoint: String,
    database: String,
    uid: i64,
    password: String,
}

impl RpcClient for JsonRpcSession {
    fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        tracing::debug!("{model}.{method} {args}");
        post(
            &self.agent,
            &self.endpoint,
            self.next_id.fetch_add(1, Ordering::Relaxed),
            "object",
            "execute_kw",
            json!([self.database, self.uid, self.password, model, method, args, kwargs]),
        )
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

fn endpoint(url: &str) -> String {
    format!("{}/jsonrpc", url.trim_end_matches('/'))
}

fn envelope(id: u64, service: &str, method: &str, args: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "call",
        "id": id,
        "params": { "service": service, "method": method, "args": args },
    })
}

fn post(
    agent: &ureq::Agent,
    endpoint: &str,
    id: u64,
    service: &str,
    method: &str,
    args: Value,
) -> Result<Value, RpcError> {
    let response = match agent
        .post(endpoint)
        .send_json(envelope(id, service, method, args))
    {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            return Err(RpcError::Transport(format!(
                "HTTP {code} {} from {endpoint}",
                response.status_text()
            )))
        }
        Err(ureq::Error::Transport(err)) => return Err(RpcError::Transport(err.to_string())),
    };
    let body: Value = response
        .into_json()
        .map_err(|e| RpcError::BadResponse(format!("response is not JSON: {e}")))?;
    parse_response(body)
}

/// Unwrap a JSON-RPC response body into its `result`.
fn parse_response(mut body: Value) -> Result<Value, RpcError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let data = error.get("data");
        let message = data
            .and_then(|d| d.get("message"))
            .or_else(|| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_owned();
        let detail = data
            .and_then(|d| d.get("debug"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        return Err(RpcError::Server { message, detail });
    }
    match body.get_mut("result").map(Value::take) {
        Some(result) => Ok(result),
        None => Err(RpcError::BadResponse(format!(
            "response has neither result nor error: {body}"
        ))),
    }
}

/// `common.login` answers the numeric uid, or `false` for bad credentials.
fn parse_uid(result: Value, username: &str) -> Result<i64, RpcError> {
    match result {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RpcError::BadResponse(format!("non-integer uid {n}"))),
        Value::Bool(false) | Value::Null => Err(RpcError::LoginRejected {
            username: username.to_owned(),
        }),
        other => Err(RpcError::BadResponse(format!("unexpected login result {other}"))),
    }
}
