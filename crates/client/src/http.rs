//! HTTP transport for the order backend: REST for backfill and commands,
//! `text/event-stream` for the live feed.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use haggl_core::config::FeedConfig;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::gateway::{ApproveResponse, CommandTransport};
use crate::sse::SseDecoder;
use crate::stream::{EventTransport, TransportError};

pub struct HttpFeedClient {
    client: Client,
    feed: FeedConfig,
    request_timeout: Duration,
    live: Mutex<Option<LiveStream>>,
}

struct LiveStream {
    response: Response,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

#[derive(Debug, Deserialize)]
struct RecentEvents {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ApproveRequest<'a> {
    order_id: &'a str,
}

impl HttpFeedClient {
    pub fn new(feed: &FeedConfig) -> Result<Self, TransportError> {
        let request_timeout = Duration::from_secs(feed.request_timeout_secs);
        // no overall timeout: the event stream stays open indefinitely
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        Ok(Self { client, feed: feed.clone(), request_timeout, live: Mutex::new(None) })
    }

    pub fn base_url(&self) -> &str {
        &self.feed.base_url
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        let url = self.feed.endpoint(path);
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status: status.as_u16(), body: error_detail(&body) })
}

/// Pull the human-readable part out of an error body when there is one.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

#[async_trait]
impl EventTransport for HttpFeedClient {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.feed.endpoint("/events/stream");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let response = ensure_success(response).await?;

        info!(event_name = "feed.http.stream_opened", url = %url, "event stream opened");
        *self.live.lock().await =
            Some(LiveStream { response, decoder: SseDecoder::new(), ready: VecDeque::new() });
        Ok(())
    }

    async fn next_payload(&self) -> Result<Option<String>, TransportError> {
        let mut live = self.live.lock().await;
        let Some(stream) = live.as_mut() else {
            return Err(TransportError::Receive("event stream is not connected".to_owned()));
        };

        loop {
            if let Some(message) = stream.ready.pop_front() {
                return Ok(Some(message));
            }
            match stream.response.chunk().await {
                Ok(Some(bytes)) => {
                    match stream.decoder.push(&bytes) {
                        Ok(messages) => stream.ready.extend(messages),
                        Err(error) => {
                            *live = None;
                            return Err(TransportError::Receive(error.to_string()));
                        }
                    }
                }
                Ok(None) => {
                    *live = None;
                    return Ok(None);
                }
                Err(error) => {
                    *live = None;
                    return Err(TransportError::Receive(error.to_string()));
                }
            }
        }
    }

    async fn fetch_recent(&self, limit: u32) -> Result<Vec<Value>, TransportError> {
        let url = self.feed.endpoint("/events/recent");
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;
        let response = ensure_success(response).await?;

        let recent: RecentEvents =
            response.json().await.map_err(|error| TransportError::Decode(error.to_string()))?;
        debug!(
            event_name = "feed.http.recent_fetched",
            count = recent.events.len(),
            "recent events fetched"
        );
        Ok(recent.events)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // dropping the response closes the connection
        if self.live.lock().await.take().is_some() {
            debug!(event_name = "feed.http.stream_closed", "event stream closed");
        }
        Ok(())
    }
}

#[async_trait]
impl CommandTransport for HttpFeedClient {
    async fn approve_order(&self, order_id: &str) -> Result<ApproveResponse, TransportError> {
        let response = self.post_json("/orders/approve", &ApproveRequest { order_id }).await?;
        response.json().await.map_err(|error| TransportError::Decode(error.to_string()))
    }

    async fn trigger_test_event(&self) -> Result<Value, TransportError> {
        let response = self.post_json("/events/test", &serde_json::json!({})).await?;
        let body =
            response.text().await.map_err(|error| TransportError::Receive(error.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body)))
    }
}
