//! `/health` HTTP responder.
//!
//! Runs on its own thread with a current-thread tokio runtime driving a hyper
//! HTTP/1 server. The listener is bound before the thread starts so a taken
//! port fails startup instead of surfacing later. `stop` signals the accept
//! loop and joins the thread; dropping the runtime cancels open connections.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::thread;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::core::errors::{MonitorError, Result};
use crate::daemon::health::HealthState;
use crate::logger::activity::ActivityLoggerHandle;

const INDEX_HTML: &str = "<!DOCTYPE html>
<html>
<head>
    <title>Bambu Monitor Health</title>
</head>
<body>
    <h1>Bambu Monitor Health Check</h1>
    <p><a href=\"/health\">Health Endpoint</a></p>
</body>
</html>";

/// Handle to the running responder thread.
pub struct HealthServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl HealthServer {
    /// Bind `addr` and start serving on a dedicated thread.
    pub fn start(
        addr: SocketAddr,
        health: HealthState,
        logger: ActivityLoggerHandle,
    ) -> Result<Self> {
        let listener = StdTcpListener::bind(addr).map_err(|e| MonitorError::Runtime {
            details: format!("failed to bind health endpoint on {addr}: {e}"),
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| MonitorError::Runtime {
                details: format!("failed to configure health listener: {e}"),
            })?;
        let local_addr = listener.local_addr().map_err(|e| MonitorError::Runtime {
            details: format!("failed to read health listener address: {e}"),
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MonitorError::Runtime {
                details: format!("failed to build health server runtime: {e}"),
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = thread::Builder::new()
            .name("bambu-health".to_string())
            .spawn(move || {
                runtime.block_on(serve(listener, health, shutdown_rx, logger));
            })
            .map_err(|e| MonitorError::Runtime {
                details: format!("failed to spawn health server thread: {e}"),
            })?;

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Stop accepting, wait for the server thread to exit.
    ///
    /// Returns `false` if the thread panicked. Calling it twice is a no-op.
    pub fn stop(&mut self) -> bool {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join.take().is_none_or(|join| join.join().is_ok())
    }
}

impl Drop for HealthServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: StdTcpListener,
    health: HealthState,
    mut shutdown_rx: oneshot::Receiver<()>,
    logger: ActivityLoggerHandle,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            logger.error(format!("health server could not adopt listener: {e}"));
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        logger.warning(format!("health server accept failed: {e}"));
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let health = health.clone();
                let logger = logger.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let response = handle_request(&req, &health);
                        async move { Ok::<_, Infallible>(response) }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        logger.debug(format!("health connection error: {e}"));
                    }
                });
            }
        }
    }
}

fn handle_request<B>(req: &Request<B>, health: &HealthState) -> Response<Full<Bytes>> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return respond(StatusCode::METHOD_NOT_ALLOWED, None, Bytes::new());
    }

    match req.uri().path() {
        "/health" => {
            let record = health.snapshot();
            let status = if record.healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            respond(status, Some("application/json"), Bytes::from(record.to_json()))
        }
        "/" => respond(
            StatusCode::OK,
            Some("text/html"),
            Bytes::from_static(INDEX_HTML.as_bytes()),
        ),
        _ => respond(StatusCode::NOT_FOUND, None, Bytes::new()),
    }
}

fn respond(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}
