use std::convert::Infallible;
use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Result;
use axum::response::sse::Event;
use bytes::Bytes;
use framework::web::sse::EventHub;
use openai::relay::TokenSink;
use tokio::sync::mpsc;

// relays tokens onto the chunked response body, one sse event per token; the
// transport flushes every event, embedded newlines become continuation lines
pub struct SseSink {
    events: mpsc::Sender<Result<Event, Infallible>>,
}

impl SseSink {
    pub fn new(events: mpsc::Sender<Result<Event, Infallible>>) -> Self {
        SseSink { events }
    }
}

impl TokenSink for SseSink {
    async fn deliver(&mut self, token: &str) -> Result<()> {
        let event = Event::default().data(token.replace('\r', ""));
        self.events.send(Ok(event)).await.map_err(|_| anyhow!("client disconnected"))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// publishes tokens to the tab's event stream with html line breaks
pub struct BroadcastSink {
    hub: Arc<EventHub>,
    stream_id: String,
}

impl BroadcastSink {
    pub fn new(hub: Arc<EventHub>, stream_id: String) -> Self {
        BroadcastSink { hub, stream_id }
    }
}

impl TokenSink for BroadcastSink {
    async fn deliver(&mut self, token: &str) -> Result<()> {
        let text = token.replace('\r', "").replace('\n', "<br>");
        self.hub.publish(&self.stream_id, Bytes::from(text));
        Ok(())
    }

    // explicit end-of-turn marker, an event-source listener cannot observe the
    // channel closing
    async fn close(&mut self) -> Result<()> {
        self.hub.publish(&self.stream_id, Bytes::from_static(b"<br><br>"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use framework::web::sse::HubConfig;
    use framework::web::sse::StreamEvent;

    use super::*;

    #[tokio::test]
    async fn broadcast_sink_rewrites_line_breaks_and_marks_end_of_turn() {
        let hub = EventHub::start(HubConfig {
            auto_replay: true,
            event_buffer: 8,
            keep_alive: None,
        });
        let mut sink = BroadcastSink::new(Arc::clone(&hub), "tab".to_string());

        sink.deliver("line\r\nnext").await.unwrap();
        sink.close().await.unwrap();

        let mut subscription = hub.subscribe("tab", None).unwrap();
        let payloads: Vec<Bytes> = [subscription.next().await.unwrap(), subscription.next().await.unwrap()]
            .iter()
            .map(|event| match event.as_ref() {
                StreamEvent::Data { data, .. } => data.clone(),
                StreamEvent::KeepAlive => panic!("unexpected keep-alive"),
            })
            .collect();
        assert_eq!(payloads, vec![Bytes::from_static(b"line<br>next"), Bytes::from_static(b"<br><br>")]);
    }

    #[tokio::test]
    async fn sse_sink_fails_once_the_receiver_is_gone() {
        let (events, receiver) = mpsc::channel(4);
        let mut sink = SseSink::new(events);
        sink.deliver("hello").await.unwrap();

        drop(receiver);
        assert!(sink.deliver("more").await.is_err());
    }
}
