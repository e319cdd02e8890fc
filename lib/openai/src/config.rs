use serde::Deserialize;

use crate::chat::ApiType;
use crate::chat::ClientOptions;
use crate::conversation::ChatProfile;

// the `openai` config section shared by both front-ends
#[derive(Debug, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_type: ApiType,
    pub api_key: String,
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub proxy: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default)]
    pub history: usize,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_stream() -> bool {
    true
}

impl OpenAiConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_key: self.api_key.clone(),
            api_type: self.api_type,
            base_url: self.api_base_url.clone(),
            proxy: self.proxy.clone(),
        }
    }

    pub fn profile(&self) -> ChatProfile {
        ChatProfile {
            user: self.user.clone(),
            model: self.model.clone(),
            system: self.system.clone(),
            stream: self.stream,
            history: self.history,
            max_tokens: self.max_tokens,
        }
    }
}
