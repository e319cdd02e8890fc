use std::time::Duration;

use framework::web::sse::HubConfig;
use openai::config::OpenAiConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub httpd: HttpdConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub sse: SseConfig,
}

#[derive(Deserialize, Debug)]
pub struct HttpdConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpdConfig {
    fn default() -> Self {
        HttpdConfig { port: default_port() }
    }
}

fn default_port() -> u16 {
    8080
}

#[derive(Deserialize, Debug)]
pub struct SseConfig {
    #[serde(default)]
    pub auto_replay: bool,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    // 0 disables the keep-alive task
    #[serde(default)]
    pub keep_alive_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        SseConfig {
            auto_replay: false,
            event_buffer: default_event_buffer(),
            keep_alive_secs: 0,
        }
    }
}

fn default_event_buffer() -> usize {
    64
}

impl SseConfig {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            auto_replay: self.auto_replay,
            event_buffer: self.event_buffer,
            keep_alive: (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs)),
        }
    }
}
