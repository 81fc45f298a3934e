//! Streaming run endpoint — server-sent events.
//!
//! Each bus event is written as `data: <json-event>\n\n`; a `{"type":"ping"}`
//! keep-alive fires every 15 seconds; the final frame is either
//! `{"type":"response",...}` or `{"type":"error",...}`.

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use talon_core::{EventBus, RunEvent};

use crate::{decode_body, ApiError, ErrorBody, SharedState};

const PING_INTERVAL: Duration = Duration::from_secs(15);

pub(crate) async fn stream_handler(
    State(state): State<SharedState>,
    bytes: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let body = decode_body(&bytes)?;
    let request = body.into_request();
    // Request shape problems surface as a regular 400, not a broken stream.
    request.validate().map_err(ApiError)?;

    let (tx, rx) = mpsc::channel::<String>(64);
    let runner = state.runner.clone();

    tokio::spawn(async move {
        let (bus, mut streams) = EventBus::new(Uuid::new_v4().to_string());
        let mut run_fut = std::pin::pin!(runner.run_streaming(
            request,
            &bus,
            CancellationToken::new()
        ));

        let outcome = loop {
            tokio::select! {
                biased;
                event = streams.progress.recv() => {
                    if let Some(event) = event {
                        forward(&tx, &event).await;
                    }
                }
                result = &mut run_fut => break result,
            }
        };

        // Drain whatever the loop emitted after the last poll.
        while let Ok(event) = streams.progress.try_recv() {
            forward(&tx, &event).await;
        }

        let last = match outcome {
            Ok(response) => serde_json::json!({"type": "response", "response": response}),
            Err(error) => serde_json::json!({"type": "error", "error": ErrorBody::from_error(&error)}),
        };
        let _ = tx.send(last.to_string()).await;
        debug!("run stream finished");
    });

    let events = ReceiverStream::new(rx).map(|data| Event::default().data(data));
    let pings = IntervalStream::new(tokio::time::interval(PING_INTERVAL))
        .map(|_| Event::default().data(r#"{"type":"ping"}"#));
    let merged = events.merge(pings).map(Ok);

    Ok(Sse::new(merged))
}

async fn forward(tx: &mpsc::Sender<String>, event: &RunEvent) {
    if let Ok(data) = serde_json::to_string(event) {
        let _ = tx.send(data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_router, build_runtime, GatewayState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use talon_config::Settings;
    use talon_runtime::ScriptedModel;
    use tower::ServiceExt;

    fn state() -> crate::SharedState {
        let mut settings = Settings::default();
        settings.working_set = vec![std::env::temp_dir().display().to_string()];
        let runner =
            build_runtime(&settings, Arc::new(ScriptedModel::always_text("streamed"))).unwrap();
        Arc::new(GatewayState { runner })
    }

    #[tokio::test]
    async fn stream_carries_events_and_final_response() {
        let app = build_router(state());
        let response = app
            .oneshot(
                Request::post("/v1/runs/stream")
                    .body(Body::from(r#"{"prompt": "stream me"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        // The stream ends when the run task drops its sender; pings keep the
        // stream open, so read frames until the final response shows up.
        let mut body = response.into_body().into_data_stream();
        let mut collected = String::new();
        while let Some(Ok(chunk)) = body.next().await {
            collected.push_str(&String::from_utf8_lossy(&chunk));
            if collected.contains(r#""type":"response""#) {
                break;
            }
        }
        assert!(collected.contains("data:"));
        assert!(collected.contains(r#""type":"response""#));
        assert!(collected.contains("streamed"));
    }

    #[tokio::test]
    async fn invalid_stream_body_is_rejected_up_front() {
        let app = build_router(state());
        let response = app
            .oneshot(
                Request::post("/v1/runs/stream")
                    .body(Body::from(r#"{"prompt": ""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
