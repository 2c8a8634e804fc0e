use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, ImageDetail, ImageUrl,
    },
};

use super::{GenerateRequest, GenerateResponse, Provider};

pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAIProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::with_config(OpenAIConfig::new().with_api_key(api_key)),
        }
    }
}

/// Text-only prompts go out as plain text; prompts with images become a
/// multi-part message with every image at high detail.
fn user_content(req: &GenerateRequest) -> ChatCompletionRequestUserMessageContent {
    if req.images.is_empty() {
        return ChatCompletionRequestUserMessageContent::Text(req.prompt.clone());
    }

    let mut parts = Vec::with_capacity(req.images.len() + 1);
    parts.push(ChatCompletionRequestUserMessageContentPart::Text(
        ChatCompletionRequestMessageContentPartText {
            text: req.prompt.clone(),
        },
    ));
    for image in &req.images {
        parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
            ChatCompletionRequestMessageContentPartImage {
                image_url: ImageUrl {
                    url: image.data_url(),
                    detail: Some(ImageDetail::High),
                },
            },
        ));
    }
    ChatCompletionRequestUserMessageContent::Array(parts)
}

fn messages(req: &GenerateRequest) -> Vec<ChatCompletionRequestMessage> {
    let system = (!req.system.is_empty()).then(|| {
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(req.system.clone()),
            name: None,
        })
    });
    let user = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: user_content(req),
        name: None,
    });
    system.into_iter().chain([user]).collect()
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        #[allow(deprecated)]
        let request = CreateChatCompletionRequest {
            model: req.model.clone(),
            messages: messages(req),
            temperature: Some(req.temperature),
            max_completion_tokens: Some(req.max_tokens),
            ..Default::default()
        };

        let response = self.client.chat().create(request).await?;
        let usage = response.usage.as_ref();
        let choice = response.choices.into_iter().next();

        Ok(GenerateResponse {
            content: choice
                .as_ref()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            finish_reason: choice
                .and_then(|c| c.finish_reason)
                .map(|r| format!("{r:?}").to_lowercase())
                .unwrap_or_default(),
            input_tokens: usage.map_or(0, |u| u.prompt_tokens),
            output_tokens: usage.map_or(0, |u| u.completion_tokens),
            model: response.model,
            cost_usd: 0.0,
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageInput;

    fn request(images: Vec<ImageInput>) -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4o-mini".to_string(),
            system: String::new(),
            prompt: "Extract the fields".to_string(),
            images,
            temperature: 0.0,
            max_tokens: 500,
            stage: "extract".to_string(),
        }
    }

    #[test]
    fn test_user_content_text_only() {
        match user_content(&request(vec![])) {
            ChatCompletionRequestUserMessageContent::Text(text) => {
                assert_eq!(text, "Extract the fields")
            }
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn test_user_content_with_images_is_multipart() {
        let images = vec![
            ImageInput {
                media_type: "image/png".to_string(),
                data_base64: "AAAA".to_string(),
            },
            ImageInput {
                media_type: "image/jpeg".to_string(),
                data_base64: "BBBB".to_string(),
            },
        ];
        match user_content(&request(images)) {
            ChatCompletionRequestUserMessageContent::Array(parts) => {
                assert_eq!(parts.len(), 3);
                match &parts[2] {
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(image) => {
                        assert_eq!(image.image_url.url, "data:image/jpeg;base64,BBBB");
                    }
                    other => panic!("expected image part, got {other:?}"),
                }
            }
            other => panic!("expected array content, got {other:?}"),
        }
    }

    #[test]
    fn test_system_message_only_when_present() {
        let mut req = request(vec![]);
        assert_eq!(messages(&req).len(), 1);

        req.system = "You read credentialing documents.".to_string();
        let built = messages(&req);
        assert_eq!(built.len(), 2);
        assert!(matches!(built[0], ChatCompletionRequestMessage::System(_)));
    }
}
