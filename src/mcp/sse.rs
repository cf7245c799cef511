//! HTTP/SSE transport for MCP server.
//!
//! Implements the MCP 2024-11-05 HTTP+SSE transport:
//!
//! - `GET /sse` opens an event stream. The first event is `endpoint`, whose
//!   data is the URL the client must POST its messages to.
//! - `POST /messages?sessionId=<id>` carries one JSON-RPC message. The POST
//!   itself is answered with `202 Accepted`; the JSON-RPC reply is sent on
//!   the session's event stream as a `message` event.
//!
//! Each session has its own [`McpServer`] (and therefore its own lifecycle
//! state). All sessions share one [`ConversionHandler`]. Tool calls run
//! outside the session lock, so one session can have several conversions
//! in flight and still answer `ping`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::mcp::server::{Dispatch, McpServer};
use crate::pandoc::ConversionHandler;

/// Path that opens an event stream.
pub const SSE_PATH: &str = "/sse";

/// Path that receives client messages.
pub const MESSAGES_PATH: &str = "/messages";

/// Largest accepted POST body.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Events buffered per session before senders wait.
const EVENT_BUFFER: usize = 32;

type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name.
    pub event: &'static str,
    /// Single-line payload.
    pub data: String,
}

impl SseEvent {
    /// The `endpoint` event announcing where to POST messages.
    #[must_use]
    pub fn endpoint(session_id: &str) -> Self {
        Self {
            event: "endpoint",
            data: format!("{MESSAGES_PATH}?sessionId={session_id}"),
        }
    }

    /// A `message` event carrying one JSON-RPC message.
    #[must_use]
    pub const fn message(json: String) -> Self {
        Self {
            event: "message",
            data: json,
        }
    }

    /// Wire encoding of the event.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }
}

struct Session {
    server: tokio::sync::Mutex<McpServer>,
    events: mpsc::Sender<SseEvent>,
}

/// HTTP/SSE front end for the MCP server.
pub struct SseServer {
    handler: Arc<ConversionHandler>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SseServer {
    /// Creates a server whose sessions share `handler`.
    #[must_use]
    pub fn new(handler: Arc<ConversionHandler>) -> Self {
        Self {
            handler,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Binds `addr` and serves until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn serve(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Serves connections from an already-bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting connections fails.
    pub async fn serve_listener(self, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            sse = SSE_PATH,
            messages = MESSAGES_PATH,
            "HTTP/SSE transport listening"
        );

        let state = Arc::new(self);
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping HTTP/SSE transport");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| Arc::clone(&state).route(req));
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            tracing::debug!(
                                peer = %peer,
                                error = %e,
                                "HTTP connection closed with error"
                            );
                        }
                    });
                }
            }
        }
    }

    /// Dispatches one HTTP request.
    ///
    /// # Errors
    ///
    /// Never fails; errors are expressed as HTTP status codes.
    pub async fn route<B>(
        self: Arc<Self>,
        req: Request<B>,
    ) -> Result<Response<ResponseBody>, Infallible>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, SSE_PATH) => self.open_stream(),
            (&Method::POST, MESSAGES_PATH) => self.post_message(req).await,
            (_, SSE_PATH | MESSAGES_PATH) => {
                status(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
            }
            _ => status(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    fn open_stream(&self) -> Response<ResponseBody> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);

        // The channel is fresh, so the first event always fits.
        let _ = events.try_send(SseEvent::endpoint(&session_id));

        let session = Arc::new(Session {
            server: tokio::sync::Mutex::new(McpServer::new(Arc::clone(&self.handler))),
            events,
        });

        {
            let mut sessions = self.lock_sessions();
            sessions.retain(|_, s| !s.events.is_closed());
            sessions.insert(session_id.clone(), session);
        }
        tracing::info!(session_id = %session_id, "SSE session opened");

        let stream = ReceiverStream::new(receiver)
            .map(|event| Ok::<_, Infallible>(Frame::data(event.encode())));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(StreamBody::new(stream).boxed_unsync())
            .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
    }

    async fn post_message<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(session_id) = req
            .uri()
            .query()
            .and_then(|q| query_param(q, "sessionId"))
            .map(str::to_string)
        else {
            return status(StatusCode::BAD_REQUEST, "missing sessionId");
        };

        let Some(session) = self.lock_sessions().get(&session_id).cloned() else {
            return status(StatusCode::NOT_FOUND, "unknown session");
        };

        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return status(StatusCode::PAYLOAD_TOO_LARGE, "message too large");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read request body");
                return status(StatusCode::BAD_REQUEST, "failed to read body");
            }
        };

        let Ok(line) = String::from_utf8(body.to_vec()) else {
            return status(StatusCode::BAD_REQUEST, "body must be UTF-8");
        };

        if session.events.is_closed() {
            self.lock_sessions().remove(&session_id);
            return status(StatusCode::NOT_FOUND, "session closed");
        }

        tokio::spawn(async move {
            // The session lock covers lifecycle bookkeeping only; a tool call
            // runs after it is released.
            let dispatched = session.server.lock().await.dispatch(&line);
            let reply = match dispatched {
                Dispatch::Reply(Some(reply)) => reply,
                Dispatch::Reply(None) => return,
                Dispatch::ToolCall(call) => call.run().await,
            };
            match reply.to_json() {
                Ok(json) => {
                    if session.events.send(SseEvent::message(json)).await.is_err() {
                        tracing::debug!(
                            session_id = %session_id,
                            "SSE client went away before reply"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialise reply"),
            }
        });

        status(StatusCode::ACCEPTED, "Accepted")
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn status(code: StatusCode, text: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())).boxed_unsync());
    *response.status_mut() = code;
    response
}

/// Returns the value of `name` in a URL query string.
fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::warn!("Could not install signal handlers; stop the server by killing it");
        std::future::pending::<()>().await;
        return;
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C");
    } else {
        std::future::pending::<()>().await;
    }
}
