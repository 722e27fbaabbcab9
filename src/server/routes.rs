//! HTTP route handlers for the relay API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::backend::{ModelList, StreamEvent};
use crate::chat::error::ChatError;
use crate::chat::message::Message;
use crate::chat::session::{GenerationSession, Termination};
use crate::stream::FrameCodec;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/models", get(list_models))
        .route("/ollama", post(chat))
        .route("/clear-history", post(clear_history))
        .route("/history", get(history))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ollama-chat-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Body of `POST /ollama`.
///
/// A `messages` array selects the raw pass-through variant; a single
/// `message` selects the server-side history variant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatRequest {
    /// Client-owned history, streamed back as raw text.
    PassThrough {
        /// Target model.
        #[serde(default)]
        model: Option<String>,
        /// Full conversation to forward.
        messages: Vec<Message>,
    },
    /// One user message appended to the server history, streamed as SSE.
    Single {
        /// Target model.
        #[serde(default)]
        model: Option<String>,
        /// User text.
        message: String,
    },
}

/// Error body returned by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure.
    pub error: String,
}

/// `GET /models` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Backend listing, nested the way Ollama returns it.
    pub models: ModelList,
}

/// `GET /history` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Server-side history, oldest first.
    pub messages: Vec<Message>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn chat_error_response(err: &ChatError) -> Response {
    match err {
        ChatError::BackendUnavailable(_) => {
            error_response(err.status_code(), "Failed to generate response")
        }
        _ => error_response(err.status_code(), err.to_string()),
    }
}

/// Proxy the backend's model listing.
async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    match state.backend.list_models().await {
        Ok(models) => Json(ModelsResponse {
            models: ModelList { models },
        })
        .into_response(),
        Err(err) => {
            tracing::error!("Error fetching models: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch models")
        }
    }
}

/// Stream a chat reply in either wire variant.
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected chat body: {}", rejection.body_text());
            return error_response(
                StatusCode::BAD_REQUEST,
                "request body must be {model, message} or {model, messages}",
            );
        }
    };
    match request {
        ChatRequest::Single { model, message } => stream_with_history(state, model, message).await,
        ChatRequest::PassThrough { model, messages } => {
            stream_pass_through(state, model, messages).await
        }
    }
}

async fn stream_with_history(
    state: Arc<AppState>,
    model: Option<String>,
    message: String,
) -> Response {
    let mut session = GenerationSession::new(state.conversation.clone(), Arc::clone(&state.backend));
    if let Err(err) = session.submit(model.as_deref(), &message).await {
        tracing::warn!("Rejected chat: {err}");
        return chat_error_response(&err);
    }

    let codec = FrameCodec::envelope();
    let opening = stream::iter(codec.encode_comment("stream started"));
    let frames = stream::unfold(Some(session), move |session| async move {
        let mut session = session?;
        match session.next_update().await {
            Some(Ok(update)) => Some((codec.encode_chunk(&update.fragment), Some(session))),
            Some(Err(err)) => {
                let frame = codec.encode_error(&err.to_string()).unwrap_or_default();
                Some((frame, None))
            }
            None => {
                let frame = match session.termination() {
                    Some(Termination::Completed) => codec.encode_done().unwrap_or_default(),
                    _ => String::new(),
                };
                Some((frame, None))
            }
        }
    });
    let body = opening
        .chain(frames)
        .filter(|frame| std::future::ready(!frame.is_empty()))
        .map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn stream_pass_through(
    state: Arc<AppState>,
    model: Option<String>,
    messages: Vec<Message>,
) -> Response {
    let Some(model) = model.filter(|m| !m.trim().is_empty()) else {
        return chat_error_response(&ChatError::InvalidInput("no model selected".to_string()));
    };
    if messages.is_empty() {
        return chat_error_response(&ChatError::InvalidInput(
            "messages must not be empty".to_string(),
        ));
    }

    let events = match state.backend.open_stream(&model, &messages).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!("Error sending message to Ollama: {err}");
            return chat_error_response(&ChatError::BackendUnavailable(err));
        }
    };

    let codec = FrameCodec::raw();
    let body = stream::unfold(Some(events), move |events| async move {
        let mut events = events?;
        loop {
            match events.next().await {
                Some(Ok(StreamEvent::Chunk(text))) if text.is_empty() => {}
                Some(Ok(StreamEvent::Chunk(text))) => {
                    return Some((Ok::<_, Infallible>(codec.encode_chunk(&text)), Some(events)));
                }
                Some(Ok(StreamEvent::Done)) | None => return None,
                Some(Err(err)) => {
                    tracing::error!("Pass-through stream failed: {err}");
                    return None;
                }
            }
        }
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Drop the server-side history.
async fn clear_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.conversation.clear().await;
    tracing::info!("Conversation history cleared");
    Json(serde_json::json!({ "success": true }))
}

/// Current server-side history.
async fn history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        messages: state.conversation.snapshot().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::backend::{ScriptStep, ScriptedBackend};
    use crate::chat::history::HistoryPolicy;

    fn app(backend: &ScriptedBackend) -> (Router, Arc<AppState>) {
        let state = AppState::with_backend(Arc::new(backend.clone()), HistoryPolicy::default());
        (create_router(Arc::clone(&state)), state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_envelope_stream_wire_format() {
        let backend = ScriptedBackend::replying(&["Hi", " there", "!"]);
        let (router, state) = app(&backend);

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let body = body_text(response).await;
        assert_eq!(
            body,
            concat!(
                ": stream started\n\n",
                "data: {\"chunk\":\"Hi\"}\n\n",
                "data: {\"chunk\":\" there\"}\n\n",
                "data: {\"chunk\":\"!\"}\n\n",
                "data: [DONE]\n\n"
            )
        );
        assert_eq!(
            state.conversation.snapshot().await,
            vec![Message::user("Hello"), Message::assistant("Hi there!")]
        );
    }

    #[tokio::test]
    async fn test_envelope_abnormal_close_has_no_marker() {
        let backend = ScriptedBackend::new(vec![ScriptStep::chunk("partial")]);
        let (router, state) = app(&backend);

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "Hello"})))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.ends_with("data: {\"chunk\":\"partial\"}\n\n"));
        assert!(!body.contains("[DONE]"));
        assert_eq!(
            state.conversation.snapshot().await.last(),
            Some(&Message::assistant("partial"))
        );
    }

    #[tokio::test]
    async fn test_envelope_mid_stream_error_frame() {
        let backend = ScriptedBackend::new(vec![
            ScriptStep::chunk("half"),
            ScriptStep::Fail("gpu fell over".to_string()),
        ]);
        let (router, state) = app(&backend);

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "Hello"})))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.contains("data: {\"error\":"));
        assert!(!body.contains("[DONE]"));
        assert_eq!(state.conversation.snapshot().await, vec![Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_pass_through_streams_raw_text() {
        let backend = ScriptedBackend::replying(&["raw ", "text"]);
        let (router, state) = app(&backend);

        let request = serde_json::json!({
            "model": "X",
            "messages": [{"role": "user", "content": "Hello"}]
        });
        let response = router.oneshot(post_json("/ollama", request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "raw text");
        assert!(state.conversation.is_empty().await);

        let requests = backend.requests().await;
        assert_eq!(requests[0].1, vec![Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let backend = ScriptedBackend::replying(&["never"]);
        let (router, state) = app(&backend);

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.calls(), 0);
        assert!(state.conversation.is_empty().await);
    }

    #[tokio::test]
    async fn test_unrecognised_body_is_structured_bad_request() {
        let backend = ScriptedBackend::replying(&["never"]);
        let (router, _state) = app(&backend);

        let response = router
            .clone()
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(error.error.contains("message"));

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ollama")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(!error.error.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_model_is_bad_request() {
        let backend = ScriptedBackend::replying(&["never"]);
        let (router, _state) = app(&backend);

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_500_with_error() {
        let backend = ScriptedBackend::replying(&["x"]).failing_with(503);
        let (router, state) = app(&backend);

        let response = router
            .clone()
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error.error, "Failed to generate response");
        assert_eq!(state.conversation.snapshot().await, vec![Message::user("Hello")]);

        let response = router
            .oneshot(Request::builder().uri("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error.error, "Failed to fetch models");
    }

    #[tokio::test]
    async fn test_busy_conversation_is_conflict() {
        let backend = ScriptedBackend::replying(&["x"]);
        let (router, state) = app(&backend);
        let _permit = state.conversation.try_begin_turn().unwrap();

        let response = router
            .oneshot(post_json("/ollama", serde_json::json!({"model": "X", "message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_models_nested_listing() {
        let backend = ScriptedBackend::default().with_models(&["llama3", "gemma3"]);
        let (router, _state) = app(&backend);

        let response = router
            .oneshot(Request::builder().uri("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["models"]["models"][0]["name"], "llama3");
        assert_eq!(body["models"]["models"][1]["name"], "gemma3");
    }

    #[tokio::test]
    async fn test_clear_history_then_history_is_empty() {
        let backend = ScriptedBackend::replying(&["Hi"]);
        let (router, state) = app(&backend);
        state.conversation.append(Message::user("Hello")).await;
        state.conversation.append(Message::assistant("Hi")).await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/clear-history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, serde_json::json!({"success": true}));

        let response = router
            .oneshot(Request::builder().uri("/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let history: HistoryResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(history.messages.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let backend = ScriptedBackend::default();
        let (router, _state) = app(&backend);
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
