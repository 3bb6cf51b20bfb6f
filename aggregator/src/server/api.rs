//! REST API consumed by agents and the web UI.
//! Serves /api/logs, /api/query, /api/stats, /api/metrics, /api/servers and
//! /api/metrics/summary with CORS.

use crate::server::AppState;
use crate::storage::{LogStats, MetricsStats};
use chrono::Local;
use hyper::{body::to_bytes, Body, Method, Request, Response, StatusCode};
use minilog_shared::wire::parse_log_entry;
use serde::Serialize;
use std::collections::HashMap;

/// Result cap of `/api/query`
pub const QUERY_LIMIT: usize = 1000;
/// Samples returned by `/api/metrics?server=...`
pub const METRICS_WINDOW: usize = 120;

#[derive(Serialize)]
struct CombinedStats {
    #[serde(flatten)]
    logs: LogStats,
    #[serde(flatten)]
    metrics: MetricsStats,
}

fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response<Body> {
    let body = serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::warn!("Failed to serialize response: {}", e);
        "null".to_string()
    });
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::from(body))
        .expect("response build")
}

fn text_response(body: String, status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::from(body))
        .expect("response build")
}

fn cors_preflight() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .header("Access-Control-Max-Age", "86400")
        .body(Body::empty())
        .expect("response build")
}

/// Parse `a=1&b=two%20words` into a map; later keys win. `+` is a space and
/// malformed escapes are kept literally.
fn query_params(query: Option<&str>) -> HashMap<String, String> {
    let decode = |s: &str| {
        let spaced = s.replace('+', " ");
        String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
    };

    query
        .unwrap_or("")
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (decode(k), decode(v))
        })
        .collect()
}

pub async fn handle_api(req: Request<Body>, state: &AppState) -> Result<Response<Body>, hyper::Error> {
    if req.method() == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let params = query_params(req.uri().query());
    let param = |key: &str| params.get(key).map(String::as_str).unwrap_or("");

    let response = match (method, path.as_str()) {
        (Method::POST, "/api/logs") => {
            let body = to_bytes(req.into_body()).await?;
            state.ingest(parse_log_entry(&body, &Local::now()));
            text_response("ok\n".to_string(), StatusCode::OK)
        }

        (Method::GET, "/api/query") => {
            let results = state
                .logs
                .query(param("keyword"), param("server"), param("level"), QUERY_LIMIT);
            // Results are newest first; render chronologically.
            let body: String = results
                .iter()
                .rev()
                .map(|e| format!("{}\n", e.to_line()))
                .collect();
            text_response(body, StatusCode::OK)
        }

        (Method::GET, "/api/stats") => json_response(
            &CombinedStats {
                logs: state.logs.stats(),
                metrics: state.metrics.stats(),
            },
            StatusCode::OK,
        ),

        (Method::GET, "/api/metrics") => {
            let server = param("server");
            let limit = if server.is_empty() { 1 } else { METRICS_WINDOW };
            json_response(&state.metrics.query(server, param("metric"), limit), StatusCode::OK)
        }

        (Method::GET, "/api/servers") => json_response(&state.metrics.server_status(), StatusCode::OK),

        (Method::GET, "/api/metrics/summary") => match param("server") {
            "" => json_response(&state.metrics.summaries(), StatusCode::OK),
            server => json_response(&state.metrics.aggregated_stats(server), StatusCode::OK),
        },

        (
            _,
            "/api/logs" | "/api/query" | "/api/stats" | "/api/metrics" | "/api/servers"
            | "/api/metrics/summary",
        ) => text_response("method not allowed\n".to_string(), StatusCode::METHOD_NOT_ALLOWED),

        _ => text_response("not found\n".to_string(), StatusCode::NOT_FOUND),
    };
    Ok(response)
}
