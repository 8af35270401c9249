//! OpenAI-compatible endpoints backed by the agent CLI.
//!
//! `POST /v1/chat/completions` flattens the conversation into one prompt,
//! resolves the model (with pinning), runs the agent once and wraps its
//! stdout. Streaming is simulated: the whole answer is sent as one delta
//! after the process exits.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use tracing::info;
use uuid::Uuid;

use super::routes::AppState;
use super::types::*;
use crate::agent::{build_prompt, AgentRequest};

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let models = state.models.models(&state.agent).await?;
    let data = models
        .into_iter()
        .map(|m| ModelObject {
            id: m.id,
            object: "model",
            owned_by: "cursor",
            name: m.display_name,
        })
        .collect();
    Ok(Json(ModelsResponse {
        object: "list",
        data,
    })
    .into_response())
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    let req: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let resolution = state.pinning.resolve(req.model.as_deref()).await;
    let prompt = build_prompt(&req.messages);
    let config = &state.config;

    let request = AgentRequest {
        prompt,
        model: Some(resolution.model.clone()),
        mode: config.mode,
        workspace: Some(config.workspace.clone()),
        force: config.force,
        approve_mcps: config.approve_mcps,
    };
    let content = state.agent.complete(&request, &config.workspace).await?;

    info!(
        "Completed chat request: model={}, messages={}, response_len={}",
        resolution.model,
        req.messages.len(),
        content.len()
    );

    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = chrono::Utc::now().timestamp();

    if req.stream.unwrap_or(false) {
        return stream_response(id, created, resolution.model, content);
    }

    Ok(Json(ChatCompletion {
        id,
        object: "chat.completion",
        created,
        model: resolution.model,
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content,
            },
            finish_reason: "stop",
        }],
        usage: Usage::default(),
    })
    .into_response())
}

/// Content delta, stop delta, `[DONE]`.
fn stream_response(
    id: String,
    created: i64,
    model: String,
    content: String,
) -> Result<Response, ApiError> {
    let chunk = |delta: Delta, finish_reason: Option<&'static str>| ChatCompletionChunk {
        id: id.clone(),
        object: "chat.completion.chunk",
        created,
        model: model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };

    let content_chunk = chunk(
        Delta {
            role: Some("assistant"),
            content: Some(content),
        },
        None,
    );
    let stop_chunk = chunk(Delta::default(), Some("stop"));

    let frames = vec![
        Event::default().data(to_json(&content_chunk)?),
        Event::default().data(to_json(&stop_chunk)?),
        Event::default().data("[DONE]"),
    ];
    let stream = futures::stream::iter(frames.into_iter().map(Ok::<_, Infallible>));
    Ok(Sse::new(stream).into_response())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value)
        .map_err(|e| ApiError::Internal(format!("Failed to encode stream chunk: {}", e)))
}
