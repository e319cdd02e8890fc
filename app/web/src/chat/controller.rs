use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::debug_handler;
use axum::extract::Query;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::response::sse::Event;
use axum::response::sse::Sse;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Form;
use axum::Router;
use bytes::Bytes;
use framework::task;
use framework::web::error::HttpError;
use framework::web::error::HttpResult;
use framework::web::sse::StreamEvent;
use futures::StreamExt;
use openai::conversation;
use openai::conversation::ChatProfile;
use openai::relay;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use super::render;
use super::sink::BroadcastSink;
use super::sink::SseSink;
use crate::AppState;

const CHAT_TEMPLATE: &str = include_str!("../../assets/chat.html");
const CHAT_INPUT_TEMPLATE: &str = include_str!("../../assets/chat_input.html");

const COOKIE_NAME: &str = "stream_id";
// browsers cap cookie expiry around 400 days, reissue on every miss
const COOKIE_MAX_AGE: u32 = 86400 * 400;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", get(chat_page))
        .route("/chat/sse", get(subscribe))
        .route("/chat/sse/msg", post(publish_message))
        .route("/chat/msg", post(direct_message))
}

#[debug_handler]
async fn chat_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (stream_id, cookie) = stream_id(&headers);
    let profile = state.config.openai.profile();

    let values = HashMap::from([("stream_id", stream_id.clone()), ("input", input_fragment(&stream_id, &profile))]);
    let mut response = Html(render::html(CHAT_TEMPLATE, &values)).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

#[derive(Deserialize)]
struct SubscribeParams {
    stream: String,
}

#[debug_handler]
async fn subscribe(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
    headers: HeaderMap,
) -> HttpResult<Response> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok());
    let Some(subscription) = state.hub.subscribe(&params.stream, last_event_id) else {
        return Err(HttpError::ServiceUnavailable("event hub is shut down".to_string()));
    };

    let stream = subscription.map(|event| Ok::<Event, Infallible>(sse_event(&event)));
    Ok(sse_response(Sse::new(stream)))
}

fn sse_event(event: &StreamEvent) -> Event {
    match event {
        StreamEvent::Data { id, data } => Event::default().id(id.to_string()).data(String::from_utf8_lossy(data)),
        StreamEvent::KeepAlive => Event::default().comment("keep-alive"),
    }
}

#[derive(Deserialize, Debug)]
struct MessageForm {
    #[serde(default)]
    stream_id: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    stream: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    system: String,
    #[serde(default)]
    max_tokens: String,
    #[serde(default)]
    history: String,
}

impl MessageForm {
    // lenient like form parsing should be: unparsable values fall back
    fn profile(&self, state: &AppState) -> ChatProfile {
        let mut profile = state.config.openai.profile();
        profile.stream = self.stream.parse().unwrap_or(false);
        if !self.model.is_empty() {
            profile.model = self.model.clone();
        }
        profile.system = self.system.clone();
        if let Ok(value) = self.max_tokens.parse() {
            profile.max_tokens = value;
        }
        if let Ok(value) = self.history.parse() {
            profile.history = value;
        }
        profile
    }
}

// one exchange per post; tokens are fanned out to the tab's event-source
// connection, the response only refreshes the input form
#[debug_handler]
async fn publish_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> HttpResult<Response> {
    if form.stream_id.is_empty() || form.prompt.is_empty() {
        let (stream_id, cookie) = stream_id(&headers);
        let profile = state.config.openai.profile();
        return Ok(input_response(&stream_id, &profile, cookie));
    }

    let profile = form.profile(&state);
    debug!(?form, "input");

    // echo the prompt to the tab before the reply starts streaming
    let echo = form.prompt.replace('\r', "").replace('\n', "<br>");
    state
        .hub
        .publish(&form.stream_id, Bytes::from(format!("<p class=\"has-text-info\">{echo}</p>")));

    let request = conversation::chat_request(&profile, &mut Vec::new(), form.prompt.clone());
    let cancel = CancellationToken::new();
    // client disconnect drops this handler and the guard cancels the invoker
    let _guard = cancel.clone().drop_guard();
    let (tokens, completion) = state.chat.start(request, cancel.child_token());
    let mut sink = BroadcastSink::new(Arc::clone(&state.hub), form.stream_id.clone());
    match relay::relay(tokens, &mut sink, &cancel).await {
        Ok(reply) => debug!(content = %reply.content, "assistant"),
        Err(error) => warn!("relay failed, error={error}"),
    }
    completion.await?;

    Ok(input_response(&form.stream_id, &profile, None))
}

// the chunked variant: tokens come back on this response as sse data events
#[debug_handler]
async fn direct_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> HttpResult<Response> {
    if form.prompt.is_empty() {
        let (stream_id, cookie) = stream_id(&headers);
        let profile = state.config.openai.profile();
        return Ok(input_response(&stream_id, &profile, cookie));
    }

    let profile = form.profile(&state);
    debug!(?form, "input");

    let request = conversation::chat_request(&profile, &mut Vec::new(), form.prompt.clone());
    let cancel = CancellationToken::new();
    let (tokens, completion) = state.chat.start(request, cancel.child_token());
    let (events, receiver) = mpsc::channel(64);

    task::spawn(async move {
        let mut sink = SseSink::new(events);
        match relay::relay(tokens, &mut sink, &cancel).await {
            Ok(reply) => debug!(content = %reply.content, "assistant"),
            Err(error) => warn!("write stream failed, error={error}"),
        }
        // a dropped response body fails the sink; stop the invoker before the barrier
        cancel.cancel();
        let _ = completion.await;
        Ok(())
    });

    Ok(sse_response(Sse::new(ReceiverStream::new(receiver))))
}

fn sse_response<S>(sse: Sse<S>) -> Response
where
    Sse<S>: IntoResponse,
{
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // nginx must not buffer event streams
    headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
    response
}

fn input_fragment(stream_id: &str, profile: &ChatProfile) -> String {
    let values = HashMap::from([
        ("stream_id", stream_id.to_string()),
        ("model", profile.model.clone()),
        ("stream", profile.stream.to_string()),
        ("system", profile.system.clone()),
        ("history", profile.history.to_string()),
        ("max_tokens", profile.max_tokens.to_string()),
    ]);
    render::html(CHAT_INPUT_TEMPLATE, &values)
}

fn input_response(stream_id: &str, profile: &ChatProfile, cookie: Option<HeaderValue>) -> Response {
    let mut response = Html(input_fragment(stream_id, profile)).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

fn cookie_stream_id(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == COOKIE_NAME).then(|| value.to_string())
    })
}

fn stream_id(headers: &HeaderMap) -> (String, Option<HeaderValue>) {
    match cookie_stream_id(headers) {
        Some(value) if value.len() == 32 => (value, None),
        _ => {
            let value = Uuid::now_v7().simple().to_string();
            let cookie = format!("{COOKIE_NAME}={value}; Max-Age={COOKIE_MAX_AGE}; Path=/");
            (value, Some(HeaderValue::from_str(&cookie).unwrap()))
        }
    }
}
