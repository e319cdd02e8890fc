use std::io::stdout;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use openai::chat_api::ChatMessage;
use openai::chat_api::Role;
use openai::conversation;
use openai::relay;
use openai::relay::TokenSink;
use tokio::io::stdin;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::config;

const PROMPT: &str = "(press 'q' to quit) > ";

#[derive(Args)]
pub struct Chat {
    #[arg(long, help = "conf path")]
    conf: Option<PathBuf>,
}

impl Chat {
    pub async fn execute(&self) -> Result<()> {
        let config = config::load(self.conf.as_deref())?;
        let client = openai::chat::Chat::new(config.openai.client_options())?;
        let profile = config.openai.profile();

        println!("---------------------");
        if !profile.system.is_empty() {
            println!("{}", profile.system);
        }

        let reader = BufReader::new(stdin());
        let mut lines = reader.lines();
        let mut history: Vec<ChatMessage> = vec![];

        loop {
            print!("{PROMPT}");
            stdout().flush()?;

            let Some(line) = lines.next_line().await? else { break };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == "q" {
                break;
            }

            let request = conversation::chat_request(&profile, &mut history, input.to_string());
            // the terminal has no cancellation source besides process exit
            let cancel = CancellationToken::new();
            let (tokens, completion) = client.start(request, cancel.clone());
            let mut sink = StdoutSink::new();
            let reply = relay::relay(tokens, &mut sink, &cancel).await?;
            completion.await?;

            if reply.fault.is_none() {
                history.push(ChatMessage::new(Role::User, input));
                history.push(ChatMessage::new(Role::Assistant, reply.content));
            }
        }

        Ok(())
    }
}

struct StdoutSink {
    out: tokio::io::Stdout,
}

impl StdoutSink {
    fn new() -> Self {
        StdoutSink {
            out: tokio::io::stdout(),
        }
    }
}

impl TokenSink for StdoutSink {
    async fn deliver(&mut self, token: &str) -> Result<()> {
        self.out.write_all(token.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.out.write_all(b"\n\n").await?;
        self.out.flush().await?;
        Ok(())
    }
}
