use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use config::Config;
use framework::json::load_file;
use framework::web::sse::EventHub;
use openai::chat::Chat;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod chat;
pub mod config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, help = "conf path")]
    conf: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<Chat>,
    pub hub: Arc<EventHub>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .init();

    let cli = Cli::parse();
    let conf = cli.conf.unwrap_or_else(|| PathBuf::from("./web.json"));
    let config: Config = load_file(&conf)?;

    let chat = Arc::new(Chat::new(config.openai.client_options())?);
    let hub = EventHub::start(config.sse.hub_config());
    let port = config.httpd.port;
    let state = AppState {
        chat,
        hub: Arc::clone(&hub),
        config: Arc::new(config),
    };

    let app = Router::new();
    let app = app.merge(chat::controller::routes());
    let app = app.with_state(state);

    framework::web::server::start_http_server(app, port).await?;
    hub.close();
    framework::task::shutdown().await;

    Ok(())
}
