use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::ClassifierConfig;
use crate::meals::repo_types::{Food, InputType};

/// Structured guess the collaborator produces for one meal. An empty `foods`
/// list is a valid low-confidence result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub name: String,
    pub icon: String,
    pub foods: Vec<Food>,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Timeout or transport trouble; worth a queue-level retry.
    #[error("transient classifier error: {0}")]
    Transient(#[source] anyhow::Error),

    /// The collaborator answered but the answer is unusable; retrying will
    /// not help.
    #[error("classification failed: {0}")]
    Fatal(#[source] anyhow::Error),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, media: Bytes, input: InputType)
        -> Result<Classification, ClassifierError>;
}

const SYSTEM_PROMPT: &str = "You are a nutrition assistant. The user sends a photo of a meal \
or a transcript of a voice note describing one. Respond with a single JSON object: \
{\"name\": short meal name in the user's language, \"icon\": one emoji, \"foods\": \
[{\"name\", \"quantity\" (e.g. \"1 unit\"), \"calories\", \"proteins\", \"carbohydrates\", \
\"fats\"}]}. Numbers are per the stated quantity. If you cannot identify any food, return \
an empty foods array.";

pub struct OpenAiClassifier {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn transcribe(&self, media: Bytes) -> Result<String, ClassifierError> {
        let part = reqwest::multipart::Part::bytes(media.to_vec())
            .file_name("meal.m4a")
            .mime_str("audio/m4a")
            .map_err(|e| ClassifierError::Fatal(e.into()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .part("file", part);

        let resp = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp)?;

        #[derive(Deserialize)]
        struct Transcription {
            text: String,
        }
        let body: Transcription = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Fatal(e.into()))?;
        Ok(body.text)
    }

    async fn complete(&self, user_content: serde_json::Value) -> Result<Classification, ClassifierError> {
        let request = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
        });

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp)?;

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Fatal(e.into()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ClassifierError::Fatal(anyhow::anyhow!("no choices in response")))?;

        parse_classification(&content)
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(
        &self,
        media: Bytes,
        input: InputType,
    ) -> Result<Classification, ClassifierError> {
        let user_content = match input {
            InputType::Audio => {
                let transcript = self.transcribe(media).await?;
                json!(transcript)
            }
            InputType::Picture => json!([{
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/jpeg;base64,{}", BASE64.encode(&media)),
                },
            }]),
        };
        self.complete(user_content).await
    }
}

/// Strict boundary between the model's loosely-typed output and the domain:
/// the payload must parse into this exact shape or the result is fatal.
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    name: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    foods: Vec<Food>,
}

fn parse_classification(content: &str) -> Result<Classification, ClassifierError> {
    let raw: RawClassification = serde_json::from_str(content)
        .map_err(|e| ClassifierError::Fatal(anyhow::anyhow!("malformed model output: {e}")))?;
    Ok(Classification {
        name: raw.name,
        icon: raw.icon,
        foods: raw.foods,
    })
}

fn transport(e: reqwest::Error) -> ClassifierError {
    ClassifierError::Transient(e.into())
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClassifierError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(ClassifierError::Transient(anyhow::anyhow!(
            "upstream returned {status}"
        )))
    } else {
        Err(ClassifierError::Fatal(anyhow::anyhow!(
            "upstream returned {status}"
        )))
    }
}
