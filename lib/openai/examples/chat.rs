use std::io::stdout;
use std::io::Write;

use anyhow::Result;
use openai::chat::Chat;
use openai::chat::ClientOptions;
use openai::conversation::chat_request;
use openai::conversation::ChatProfile;
use openai::relay::ChatToken;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let chat = Chat::new(ClientOptions {
        api_key: "env:OPENAI_API_KEY".to_string(),
        ..ClientOptions::default()
    })?;

    let profile = ChatProfile {
        model: "gpt-3.5-turbo".to_string(),
        stream: true,
        ..ChatProfile::default()
    };
    let request = chat_request(&profile, &mut vec![], "hello".to_string());

    let (mut tokens, task) = chat.start(request, CancellationToken::new());
    while let Some(token) = tokens.recv().await {
        if let ChatToken::Content(text) = token {
            print!("{text}");
            stdout().flush()?;
        }
    }
    task.await?;

    Ok(())
}
