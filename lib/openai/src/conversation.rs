use crate::chat_api::ChatMessage;
use crate::chat_api::ChatRequest;
use crate::chat_api::Role;

const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct ChatProfile {
    pub user: String,
    pub model: String,
    pub system: String,
    pub stream: bool,
    pub history: usize,
    pub max_tokens: u32,
}

// assembles [system?, ...history, user]; history is caller owned and trimmed in
// place so the next exchange starts from the retained window
pub fn chat_request(profile: &ChatProfile, history: &mut Vec<ChatMessage>, prompt: String) -> ChatRequest {
    trim_history(history, profile.history);

    let mut messages = Vec::with_capacity(history.len() + 2);
    if !profile.system.is_empty() {
        messages.push(ChatMessage::new(Role::System, profile.system.clone()));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::new(Role::User, prompt));

    ChatRequest {
        model: profile.model.clone(),
        messages,
        temperature: TEMPERATURE,
        top_p: TOP_P,
        n: 1,
        stream: profile.stream,
        max_tokens: (profile.max_tokens > 0).then_some(profile.max_tokens),
        presence_penalty: 0.0,
        frequency_penalty: 0.0,
        user: (!profile.user.is_empty()).then(|| profile.user.clone()),
    }
}

// history holds whole (user, assistant) pairs; every excess pair is dropped from
// the oldest end in one pass, so retained pairs never exceed the limit even
// after the limit was lowered between exchanges
pub fn trim_history(history: &mut Vec<ChatMessage>, limit: usize) {
    let excess = (history.len() / 2).saturating_sub(limit);
    if excess > 0 {
        history.drain(..excess * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(history: &mut Vec<ChatMessage>, user: &str, assistant: &str) {
        history.push(ChatMessage::new(Role::User, user));
        history.push(ChatMessage::new(Role::Assistant, assistant));
    }

    fn profile(system: &str, history: usize) -> ChatProfile {
        ChatProfile {
            model: "gpt-3.5-turbo".to_string(),
            system: system.to_string(),
            history,
            ..ChatProfile::default()
        }
    }

    #[test]
    fn oldest_pair_is_dropped_beyond_the_limit() {
        let mut history = vec![];
        pair(&mut history, "u1", "a1");
        pair(&mut history, "u2", "a2");
        pair(&mut history, "u3", "a3");

        let request = chat_request(&profile("You are helpful", 2), &mut history, "Hi".to_string());

        let contents: Vec<&str> = request.messages.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["You are helpful", "u2", "a2", "u3", "a3", "Hi"]);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let mut history = vec![];
        let request = chat_request(&profile("", 4), &mut history, "Hi".to_string());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0], ChatMessage::new(Role::User, "Hi"));
    }

    #[test]
    fn zero_limit_excludes_history() {
        let mut history = vec![];
        pair(&mut history, "u1", "a1");

        let request = chat_request(&profile("", 0), &mut history, "Hi".to_string());

        assert_eq!(request.messages.len(), 1);
        assert!(history.is_empty());
    }

    #[test]
    fn all_excess_pairs_are_dropped_in_one_pass() {
        let mut history = vec![];
        for i in 0..5 {
            pair(&mut history, &format!("u{i}"), &format!("a{i}"));
        }

        trim_history(&mut history, 2);

        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "u3");
    }

    #[test]
    fn retained_prior_entries_stay_paired_and_bounded() {
        for pairs in 0..6 {
            for limit in 0..4 {
                let mut history = vec![];
                for i in 0..pairs {
                    pair(&mut history, &format!("u{i}"), &format!("a{i}"));
                }
                let request = chat_request(&profile("", limit), &mut history, "Hi".to_string());
                let prior = request.messages.len() - 1;
                assert_eq!(prior % 2, 0);
                assert!(prior <= 2 * limit);
            }
        }
    }

    #[test]
    fn sampling_parameters_are_fixed() {
        let request = chat_request(&profile("", 0), &mut vec![], "Hi".to_string());
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.top_p, 1.0);
        assert_eq!(request.n, 1);
        assert_eq!(request.presence_penalty, 0.0);
        assert_eq!(request.frequency_penalty, 0.0);
        assert_eq!(request.max_tokens, None);
    }
}
