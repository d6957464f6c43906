//! HTTP administration API.
//!
//! A lightweight hyper server exposing the device's administrative
//! operations: parameter reads/writes, global and per-command delays, the
//! mismatch payload, and the out-of-band trigger. Routing is by method and
//! path segments:
//!
//! ```text
//! GET  /{param}                         current value
//! POST /{param}/{value}                 set (string coercion)
//! GET  /delay/{type}                    global delay
//! POST /delay/{type}/{value}            set global delay
//! GET  /delay/{type}/{param}            effective per-command delay
//! POST /delay/{type}/{param}/{value}    set per-command delay
//! GET  /mismatch                        mismatch payload
//! POST /mismatch/{value}                set mismatch payload
//! POST /trigger/{param}                 trigger a response emission
//! ```
//!
//! Errors surface as HTTP 500 with the error message; the wire protocol
//! itself never sees admin diagnostics.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};
use tracing::info;

use crate::device::StreamDevice;
use crate::error::SimError;
use crate::parameter::Value;

/// Handle returned by [`start_admin_server`]; dropping it stops the server.
pub struct AdminServerHandle {
    pub local_addr: SocketAddr,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

/// Spawn the admin HTTP server on `addr`.
pub async fn start_admin_server(
    addr: SocketAddr,
    device: Arc<StreamDevice>,
) -> Result<AdminServerHandle, hyper::Error> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let make_service = hyper::service::make_service_fn(move |_conn| {
        let device = device.clone();
        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req| {
                handle_request(req, device.clone())
            }))
        }
    });

    let server = hyper::Server::try_bind(&addr)?.serve(make_service);
    let local_addr = server.local_addr();
    let server = server.with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });

    info!(%local_addr, "admin API listening");

    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "admin server error");
        }
    });

    Ok(AdminServerHandle {
        local_addr,
        _shutdown_tx: shutdown_tx,
    })
}

pub(crate) async fn handle_request(
    req: Request<Body>,
    device: Arc<StreamDevice>,
) -> Result<Response<Body>, Infallible> {
    let decoded: Vec<String> = req
        .uri()
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(percent_decode)
        .collect();
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    let outcome: Result<String, SimError> = match (req.method(), segments.as_slice()) {
        (&Method::GET, &["mismatch"]) => {
            info!("api: get mismatch");
            Ok(String::from_utf8_lossy(&device.get_mismatch()).into_owned())
        }
        (&Method::POST, &["mismatch", value]) => {
            info!(value, "api: set mismatch");
            device
                .set_mismatch(value)
                .map(|_| "Mismatch set successfully".to_string())
        }
        (&Method::GET, &["delay", typ]) => {
            info!(typ, "api: get global delay");
            device
                .get_global_delay(typ)
                .map(|d| humantime::format_duration(d).to_string())
        }
        (&Method::POST, &["delay", typ, value]) => {
            info!(typ, value, "api: set global delay");
            device
                .set_global_delay(typ, value)
                .map(|_| "Delay set successfully".to_string())
        }
        (&Method::GET, &["delay", typ, param]) => {
            info!(typ, param, "api: get delay");
            device
                .get_param_delay(typ, param)
                .map(|d| humantime::format_duration(d).to_string())
        }
        (&Method::POST, &["delay", typ, param, value]) => {
            info!(typ, param, value, "api: set delay");
            device
                .set_param_delay(typ, param, value)
                .map(|_| "Delay set successfully".to_string())
        }
        (&Method::POST, &["trigger", param]) => {
            info!(param, "api: trigger");
            device
                .trigger(param)
                .map(|_| "Parameter triggered successfully".to_string())
        }
        (&Method::GET, &[param]) => {
            info!(param, "api: get parameter");
            device.get_parameter(param).map(|v| v.to_string())
        }
        (&Method::POST, &[param, value]) => {
            info!(param, value, "api: set parameter");
            device
                .set_parameter(param, Value::String(value.to_string()))
                .map(|_| "Parameter set successfully".to_string())
        }
        _ => {
            return Ok(plain_response(StatusCode::NOT_FOUND, "Not found".into()));
        }
    };

    let response = match outcome {
        Ok(body) => plain_response(StatusCode::OK, body),
        Err(err) => plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {err}"),
        ),
    };
    Ok(response)
}

fn plain_response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// Minimal percent-decoding for path segments; invalid escapes pass through.
fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdfile::VdFile;
    use std::time::Duration;

    const CONFIG: &str = r#"
in_terminator = "\r\n"
out_terminator = "\r\n"
mismatch = "ERR"

[[parameter]]
name = "volt"
type = "float32"
value = 1.0

[[command]]
param = "volt"
req = "VOLT?"
res = "VOLT %.3f"
set = "VOLT %.3f"
ack = "OK"
"#;

    fn device() -> Arc<StreamDevice> {
        Arc::new(StreamDevice::new(VdFile::from_str(CONFIG).unwrap()))
    }

    async fn call(
        device: &Arc<StreamDevice>,
        method: Method,
        path: &str,
    ) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let resp = handle_request(req, device.clone()).await.unwrap();
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn get_and_set_parameter() {
        let dev = device();
        let (status, body) = call(&dev, Method::GET, "/volt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "1");

        let (status, body) = call(&dev, Method::POST, "/volt/2.5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Parameter set successfully");

        let (_, body) = call(&dev, Method::GET, "/volt").await;
        assert_eq!(body, "2.5");
    }

    #[tokio::test]
    async fn unknown_parameter_is_a_server_error() {
        let dev = device();
        let (status, body) = call(&dev, Method::GET, "/ghost").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("parameter ghost not found"));
    }

    #[tokio::test]
    async fn delay_routes() {
        let dev = device();
        let (status, body) = call(&dev, Method::POST, "/delay/res/500ms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Delay set successfully");

        let (_, body) = call(&dev, Method::GET, "/delay/res").await;
        assert_eq!(body, "500ms");

        // Per-command getter reports the effective delay.
        let (_, body) = call(&dev, Method::GET, "/delay/res/volt").await;
        assert_eq!(body, "500ms");

        let (status, _) = call(&dev, Method::POST, "/delay/res/volt/100ms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            dev.get_param_delay("res", "volt").unwrap(),
            Duration::from_millis(100)
        );

        let (status, body) = call(&dev, Method::GET, "/delay/nope").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("delay nope not found"));
    }

    #[tokio::test]
    async fn mismatch_routes() {
        let dev = device();
        let (_, body) = call(&dev, Method::GET, "/mismatch").await;
        assert_eq!(body, "ERR");

        let (status, _) = call(&dev, Method::POST, "/mismatch/FAULT%20404").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dev.get_mismatch(), b"FAULT 404".to_vec());

        let long = "x".repeat(256);
        let (status, body) = call(&dev, Method::POST, &format!("/mismatch/{long}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("255"));
    }

    #[tokio::test]
    async fn trigger_routes() {
        let dev = device();
        let mut rx = dev.take_triggered().unwrap();

        let (status, body) = call(&dev, Method::POST, "/trigger/volt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Parameter triggered successfully");
        assert_eq!(rx.recv().await.unwrap(), b"VOLT 1.000\r\n".to_vec());

        let (status, body) = call(&dev, Method::POST, "/trigger/ghost").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("not found"));
    }

    #[tokio::test]
    async fn unroutable_paths_are_not_found() {
        let dev = device();
        let (status, _) = call(&dev, Method::GET, "/a/b/c/d/e").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&dev, Method::DELETE, "/volt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
