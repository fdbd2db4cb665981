//! WebSocket progress streaming.
//!
//! One socket per job. Events are forwarded as JSON text frames in
//! emission order and the stream ends after a terminal event. Clients
//! that connect after the job finished get one synthetic terminal event
//! built from the record, then a close frame; clients that miss the
//! window entirely poll the REST endpoint instead.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use vcast_models::{Job, JobId, JobStatus, ProgressEvent};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /ws/jobs/:job_id/progress
pub async fn ws_job_progress(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let id = JobId::from_string(job_id);
    let job = state
        .store
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("No job with id {}", id)))?;

    // Subscribe before the upgrade completes so events emitted during
    // the handshake are not missed.
    let rx = if job.status.is_terminal() {
        None
    } else {
        Some(state.progress.subscribe(&id).await)
    };

    Ok(ws.on_upgrade(move |socket| handle_progress_socket(socket, job, rx)))
}

async fn handle_progress_socket(
    mut socket: WebSocket,
    job: Job,
    rx: Option<tokio::sync::broadcast::Receiver<ProgressEvent>>,
) {
    let Some(mut rx) = rx else {
        // Already terminal: replay one event built from the record.
        if let Some(event) = terminal_event(&job) {
            send_event(&mut socket, &event).await;
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    if !send_event(&mut socket, &event).await {
                        return;
                    }
                    if terminal {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job_id = %job.id, skipped, "Progress subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(job_id = %job.id, "Progress subscriber disconnected");
                    return;
                }
                Some(Ok(_)) => {} // ignore client chatter and pings
                Some(Err(_)) => return,
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Synthetic terminal event for sockets attaching after the fact.
fn terminal_event(job: &Job) -> Option<ProgressEvent> {
    match job.status {
        JobStatus::Completed => Some(ProgressEvent::completed(
            job.result
                .as_ref()
                .map(|r| r.outputs.clone())
                .unwrap_or_default(),
        )),
        JobStatus::Failed => job.error.as_ref().map(ProgressEvent::error),
        _ => None,
    }
}

async fn send_event(socket: &mut WebSocket, event: &ProgressEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(_) => false,
    }
}
