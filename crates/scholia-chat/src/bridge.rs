//! Gateway bridge with the fixed assistant persona.
//!
//! Every outgoing completion request carries the persona as its leading
//! system message, whether it serves classification, synthesis, follow-up
//! generation, naming, or summarization.

use std::sync::Arc;

use scholia_llm::{ChatMessage, CompletionRequest, LlmError, LlmGateway};

/// Persona prepended to every request.
pub const PERSONA: &str = "Your name is Scholia. You are a helpful research assistant that can \
answer questions about scientific topics and recommend research literature from a curated \
database of scientific papers. You ground your answers in the provided papers whenever papers \
are provided.";

/// Persona-prepending wrapper around the language-model gateway.
#[derive(Clone)]
pub struct GatewayBridge {
    gateway: Arc<dyn LlmGateway>,
}

impl GatewayBridge {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Send a request with the persona prepended, using gateway defaults for
    /// model and token cap.
    pub async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.ask_with(messages, None).await
    }

    /// Send a request with the persona prepended and an explicit token cap.
    pub async fn ask_with(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage::system(PERSONA));
        all.extend(messages);
        self.gateway
            .complete(CompletionRequest {
                messages: all,
                max_tokens,
                model: None,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholia_llm::Role;
    use std::sync::Mutex;

    struct Recorder {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmGateway for Recorder {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request);
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn test_persona_prepended() {
        let recorder = Arc::new(Recorder {
            requests: Mutex::new(vec![]),
        });
        let bridge = GatewayBridge::new(recorder.clone());
        bridge.ask(vec![ChatMessage::user("hello")]).await.unwrap();

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, PERSONA);
        assert_eq!(requests[0].messages[1].content, "hello");
        assert!(requests[0].max_tokens.is_none());
    }

    #[tokio::test]
    async fn test_ask_with_token_cap() {
        let recorder = Arc::new(Recorder {
            requests: Mutex::new(vec![]),
        });
        let bridge = GatewayBridge::new(recorder.clone());
        bridge
            .ask_with(vec![ChatMessage::user("summarize")], Some(4000))
            .await
            .unwrap();

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(4000));
    }
}
