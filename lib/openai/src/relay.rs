use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Sentinel;

// channel element produced by the invoker; a Fault is always the final element
// and channel closure is the only end-of-turn signal
#[derive(Debug, PartialEq, Eq)]
pub enum ChatToken {
    Content(String),
    Fault(Sentinel),
}

#[derive(Debug, Default)]
pub struct Reply {
    pub content: String,
    pub fault: Option<Sentinel>,
}

#[allow(async_fn_in_trait)]
pub trait TokenSink {
    async fn deliver(&mut self, token: &str) -> Result<()>;

    // end-of-turn marker, invoked on channel closure only, never on cancellation
    async fn close(&mut self) -> Result<()>;
}

// drains the token channel in arrival order into one sink, accumulating the
// full reply; cancellation wins over a ready token and abandons the channel
pub async fn relay<S>(mut tokens: mpsc::Receiver<ChatToken>, sink: &mut S, cancel: &CancellationToken) -> Result<Reply>
where
    S: TokenSink,
{
    let mut reply = Reply::default();
    loop {
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(reply),
            token = tokens.recv() => token,
        };
        let Some(token) = token else { break };
        let text = match token {
            ChatToken::Content(text) => text,
            ChatToken::Fault(sentinel) => {
                let marker = format!("[[{}]]", sentinel.text);
                reply.fault = Some(sentinel);
                marker
            }
        };
        reply.content.push_str(&text);
        sink.deliver(&text).await?;
    }
    sink.close().await?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::error::Retry;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Vec<String>,
        closed: bool,
        fail: bool,
    }

    impl TokenSink for RecordingSink {
        async fn deliver(&mut self, token: &str) -> Result<()> {
            if self.fail {
                bail!("sink write failed");
            }
            self.delivered.push(token.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn tokens_are_delivered_in_order_and_accumulated() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ChatToken::Content("Hel".to_string())).await.unwrap();
        tx.send(ChatToken::Content("lo".to_string())).await.unwrap();
        drop(tx);

        let mut sink = RecordingSink::default();
        let reply = relay(rx, &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(reply.content, "Hello");
        assert!(reply.fault.is_none());
        assert_eq!(sink.delivered, vec!["Hel", "lo"]);
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn fault_is_rendered_inline_and_recorded() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ChatToken::Content("partial".to_string())).await.unwrap();
        tx.send(ChatToken::Fault(Sentinel {
            text: "too many requests".to_string(),
            retry: Retry::Yes,
        }))
        .await
        .unwrap();
        drop(tx);

        let mut sink = RecordingSink::default();
        let reply = relay(rx, &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(reply.content, "partial[[too many requests]]");
        assert_eq!(reply.fault.as_ref().unwrap().retry, Retry::Yes);
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn cancellation_returns_prefix_and_stops_reading() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ChatToken::Content("late".to_string())).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut sink = RecordingSink::default();
        let reply = relay(rx, &mut sink, &cancel).await.unwrap();

        assert_eq!(reply.content, "");
        assert!(sink.delivered.is_empty());
        assert!(!sink.closed);
        // the receiver was abandoned, nothing reads the channel anymore
        assert!(tx.send(ChatToken::Content("more".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn sink_failure_aborts_the_exchange() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ChatToken::Content("text".to_string())).await.unwrap();
        drop(tx);

        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        assert!(relay(rx, &mut sink, &CancellationToken::new()).await.is_err());
        assert!(!sink.closed);
    }
}
