use std::path::Path;

use anyhow::Result;
use framework::json;
use openai::config::OpenAiConfig;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, Debug)]
pub struct Config {
    pub openai: OpenAiConfig,
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let default_config_path = format!("{}/.config/aichat/aichat.json", env!("HOME"));
    let path = path.unwrap_or(Path::new(&default_config_path));
    info!("load config, path={}", path.to_string_lossy());
    json::load_file(path)
}
