use std::{borrow::Cow, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{BodyStream, Extension},
    http::{header::HOST, HeaderMap, Method, StatusCode, Uri},
    routing::any,
    Router,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    alert::{self, DecodeError},
    renderer,
    settings::Settings,
    webhook::WebhookClient,
};

/// at most this many bytes of an undecodable body end up in the log
pub const MAX_LOGGED_BODY: usize = 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct ReceiverSettings {
    /// maximum size of an accepted request body in bytes
    pub body_limit: usize,
}

struct State {
    webhook: WebhookClient,
    body_limit: usize,
}

impl State {
    pub fn new(settings: &Settings) -> Result<Self> {
        let webhook = WebhookClient::new(settings.webhook_url.clone(), settings.delivery.timeout)
            .context("failed to build webhook client")?;

        Ok(Self {
            webhook,
            body_limit: settings.receiver.body_limit,
        })
    }
}

#[derive(Error, Debug)]
enum ReadError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("failed to read request body")]
    Transport(#[from] axum::Error),
}

impl ReadError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// collects the request body, refusing to buffer more than `limit` bytes
async fn read_body(mut body: BodyStream, limit: usize) -> Result<Bytes, ReadError> {
    let mut buf = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;

        if buf.len() + chunk.len() > limit {
            return Err(ReadError::TooLarge(limit));
        }

        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

/// Lossy utf-8 rendition of the first [MAX_LOGGED_BODY] bytes of `body`.
/// A character cut in half at the end is dropped.
fn truncate_body(body: &[u8]) -> Cow<'_, str> {
    if body.len() <= MAX_LOGGED_BODY {
        return String::from_utf8_lossy(body);
    }

    let head = &body[..MAX_LOGGED_BODY];
    let head = match std::str::from_utf8(head) {
        Err(err) if err.error_len().is_none() => &head[..err.valid_up_to()],
        _ => head,
    };

    let mut text = String::from_utf8_lossy(head).into_owned();

    // replacement characters are wider than the bytes they replace
    let mut end = text.len().min(MAX_LOGGED_BODY);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str("...");

    Cow::Owned(text)
}

async fn alertmanager_receiver(
    Extension(state): Extension<Arc<State>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: BodyStream,
) -> StatusCode {
    let host = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or_default();
    info!("{} - [{}] {}", host, method, uri.path());

    let body = match read_body(body, state.body_limit).await {
        Ok(body) => body,
        Err(err) => {
            let status = err.status_code();
            error!("{:#}", anyhow::Error::from(err));
            return status;
        }
    };

    let data = match alert::decode(&body) {
        Ok(data) => data,
        Err(DecodeError::MisconfiguredSender { alerts, alertnames }) => {
            warn!(r"/!\ -- You have misconfigured this software -- /!\");
            warn!("--- --                                      -- ---");
            warn!(alerts, ?alertnames, "{}", renderer::MISCONFIGURED_DESCRIPTION);

            if let Err(err) = state.webhook.send(&renderer::misconfiguration_notice()).await {
                warn!(
                    "failed to deliver misconfiguration notice: {:#}",
                    anyhow::Error::from(err)
                );
            }

            return StatusCode::BAD_REQUEST;
        }
        Err(err @ DecodeError::Malformed(_)) => {
            error!(
                error = %err,
                "Failed to unpack inbound alert request - {}",
                truncate_body(&body)
            );
            return StatusCode::BAD_REQUEST;
        }
    };

    let messages = renderer::render(&data);
    let failed = state.webhook.send_all(&messages).await;

    if failed > 0 {
        warn!(
            "{} of {} message(s) for group {} could not be delivered",
            failed,
            messages.len(),
            data.group_key
        );
    }

    StatusCode::OK
}

/// Every path and every method end up at the same handler.
fn router(state: Arc<State>) -> Router {
    Router::new()
        .fallback(any(alertmanager_receiver))
        .layer(Extension(state))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

pub async fn run_alertmanager_receiver(settings: &Settings) -> Result<()> {
    let state = Arc::new(State::new(settings)?);
    let addr = settings.listen_address;

    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to listen on {addr}"))?;

    info!("Listening on: {}", addr);

    server
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("alertmanager endpoint crashed")?;

    Ok(())
}
