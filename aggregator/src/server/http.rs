//! HTTP server: admin endpoints (/healthz, /metrics) and the /api routes.

use crate::metrics;
use crate::server::{api, AppState};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::net::SocketAddr;

/// Bind `addr` and serve until the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { handle(req, &state).await }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("HTTP server listening on {}", addr);
    server.await
}

pub async fn handle(req: Request<Body>, state: &AppState) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path().to_string();
    let response = match path.as_str() {
        "/healthz" => Response::new(Body::from("ok\n")),

        "/metrics" => Response::builder()
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Body::from(metrics::encode_metrics()))
            .expect("response build"),

        p if p.starts_with("/api/") => api::handle_api(req, state).await?,

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found\n"))
            .expect("response build"),
    };

    tracing::debug!(path = %path, status = %response.status().as_u16(), "http request");
    Ok(response)
}
