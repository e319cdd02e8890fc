use std::collections::HashMap;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub auto_replay: bool,
    pub event_buffer: usize,
    pub keep_alive: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            auto_replay: false,
            event_buffer: 64,
            keep_alive: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamEvent {
    // event ids are monotonic within one stream, starting at 1
    Data { id: u64, data: Bytes },
    KeepAlive,
}

struct StreamState {
    sender: broadcast::Sender<Arc<StreamEvent>>,
    backlog: VecDeque<Arc<StreamEvent>>,
    last_event_id: u64,
}

impl StreamState {
    fn new(event_buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(event_buffer.max(1));
        StreamState {
            sender,
            backlog: VecDeque::new(),
            last_event_id: 0,
        }
    }
}

struct HubState {
    streams: HashMap<String, StreamState>,
    closed: bool,
}

// process-wide event hub, shared by all http connections; streams are created
// on first subscribe or publish and dropped at close()
pub struct EventHub {
    config: HubConfig,
    state: Mutex<HubState>,
    shutdown: CancellationToken,
}

impl EventHub {
    pub fn start(config: HubConfig) -> Arc<EventHub> {
        let hub = Arc::new(EventHub {
            config,
            state: Mutex::new(HubState {
                streams: HashMap::new(),
                closed: false,
            }),
            shutdown: CancellationToken::new(),
        });
        if let Some(interval) = hub.config.keep_alive {
            let hub = Arc::clone(&hub);
            task::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = hub.shutdown.cancelled() => break,
                        _ = ticker.tick() => hub.publish_keep_alive(),
                    }
                }
                Ok(())
            });
        }
        hub
    }

    // returns None once the hub is closed; with auto_replay the subscriber first
    // receives buffered events newer than last_event_id, then live events
    pub fn subscribe(&self, stream_id: &str, last_event_id: Option<u64>) -> Option<Subscription> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let event_buffer = self.config.event_buffer;
        let stream = state
            .streams
            .entry(stream_id.to_string())
            .or_insert_with(|| StreamState::new(event_buffer));
        let live = BroadcastStream::new(stream.sender.subscribe());
        let backlog = if self.config.auto_replay {
            let last_seen = last_event_id.unwrap_or(0);
            stream
                .backlog
                .iter()
                .filter(|event| matches!(event.as_ref(), StreamEvent::Data { id, .. } if *id > last_seen))
                .cloned()
                .collect()
        } else {
            VecDeque::new()
        };
        debug!(stream_id, subscribers = stream.sender.receiver_count(), "subscribed");
        Some(Subscription { backlog, live })
    }

    // enqueues to every current subscriber of the stream; a slow subscriber lags
    // and loses its oldest events instead of blocking the publisher
    pub fn publish(&self, stream_id: &str, data: Bytes) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        let event_buffer = self.config.event_buffer;
        let stream = state
            .streams
            .entry(stream_id.to_string())
            .or_insert_with(|| StreamState::new(event_buffer));
        stream.last_event_id += 1;
        let event = Arc::new(StreamEvent::Data {
            id: stream.last_event_id,
            data,
        });
        if stream.backlog.len() >= event_buffer.max(1) {
            stream.backlog.pop_front();
        }
        stream.backlog.push_back(Arc::clone(&event));
        let _ = stream.sender.send(event);
    }

    fn publish_keep_alive(&self) {
        let state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        for stream in state.streams.values() {
            let _ = stream.sender.send(Arc::new(StreamEvent::KeepAlive));
        }
    }

    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .streams
            .get(stream_id)
            .map(|stream| stream.sender.receiver_count())
            .unwrap_or(0)
    }

    // in-flight publishes after close are discarded, new subscriptions rejected,
    // existing subscriber streams terminate
    pub fn close(&self) {
        self.shutdown.cancel();
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.streams.clear();
    }
}

pub struct Subscription {
    backlog: VecDeque<Arc<StreamEvent>>,
    live: BroadcastStream<Arc<StreamEvent>>,
}

impl Stream for Subscription {
    type Item = Arc<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.backlog.pop_front() {
            return Poll::Ready(Some(event));
        }
        loop {
            match Pin::new(&mut self.live).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                // lagged subscriber: oldest events were dropped, keep reading
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
