use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<Usage>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: i64,
    pub message: ChatResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    pub role: Role,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatStreamResponse {
    pub choices: Vec<ChatStreamChoice>,
    pub usage: Option<Usage>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct ChatStreamChoice {
    pub index: i64,
    pub delta: ChatStreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatStreamDelta {
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_unset_optional_fields() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            temperature: 0.7,
            top_p: 1.0,
            n: 1,
            stream: true,
            max_tokens: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            user: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("user"));
        assert!(json.contains(r#""role":"user""#));
        assert!(json.contains(r#""stream":true"#));
    }

    #[test]
    fn request_serializes_max_tokens_when_set() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![],
            temperature: 0.7,
            top_p: 1.0,
            n: 1,
            stream: false,
            max_tokens: Some(256),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            user: Some("tester".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""max_tokens":256"#));
        assert!(json.contains(r#""user":"tester""#));
    }

    #[test]
    fn stream_response_parses_delta_content() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"},"finish_reason":null}]}"#;
        let response: ChatStreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(response.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn api_error_body_parses_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let response: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.error.message, "Rate limit reached");
    }
}
