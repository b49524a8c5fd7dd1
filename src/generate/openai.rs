// src/generate/openai.rs
//! OpenAI-compatible chat-completions generator (also works with local servers that
//! mimic the API, via `base_url`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{show_notes, Generator, Narration, WORDS_PER_MINUTE};
use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::model::SelectedArticle;

const MAX_TOKENS_CAP: u32 = 4000;

pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiGenerator {
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let http = reqwest::Client::builder()
            .user_agent(concat!("newsrank/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_key,
            api_key_env: cfg.api_key_env.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

fn system_prompt(target_minutes: u32) -> String {
    let words = target_minutes * WORDS_PER_MINUTE;
    format!(
        "You write spoken news briefings. Target length: about {words} words \
         ({target_minutes} minutes read aloud). Cover the stories in the given order, \
         attribute each to its outlet, plain prose, no markdown, no emojis."
    )
}

#[async_trait::async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        selection: &[SelectedArticle],
        target_minutes: u32,
        run_date: NaiveDate,
    ) -> Result<Narration, GenerationError> {
        if selection.is_empty() {
            return Err(GenerationError::EmptySelection);
        }
        let Some(key) = self.api_key.as_deref() else {
            return Err(GenerationError::MissingApiKey(self.api_key_env.clone()));
        };

        let sys = system_prompt(target_minutes);
        let notes = show_notes(selection, run_date);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &sys,
                },
                Msg {
                    role: "user",
                    content: &notes,
                },
            ],
            temperature: 0.4,
            max_tokens: (target_minutes * WORDS_PER_MINUTE + 200).min(MAX_TOKENS_CAP),
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().await.unwrap_or_default().chars().take(300).collect();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: Resp = resp.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        tracing::info!(target: "generate", model = %self.model, words = super::word_count(&text), "narration generated");
        Ok(Narration::new(text))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn prompt_targets_word_count() {
        assert!(system_prompt(10).contains("about 1600 words"));
    }

    #[tokio::test]
    #[serial]
    async fn missing_key_is_a_generation_error() {
        let cfg = GeneratorConfig {
            api_key_env: "NEWSRANK_TEST_MISSING_KEY".into(),
            ..GeneratorConfig::default()
        };
        std::env::remove_var("NEWSRANK_TEST_MISSING_KEY");
        let g = OpenAiGenerator::from_config(&cfg).unwrap();
        let sel = vec![crate::model::SelectedArticle {
            article: crate::model::Article {
                id: 1,
                canonical_url: "https://a.example/1".into(),
                title: "t".into(),
                excerpt: String::new(),
                fingerprint: "fp".into(),
                outlet: None,
                published_at: None,
                source_id: "s".into(),
                first_seen_at: chrono::Utc::now(),
                last_seen_at: chrono::Utc::now(),
            },
            run_article: crate::model::RunArticle {
                run_id: 1,
                article_id: 1,
                score: crate::model::ScoreBreakdown {
                    total: 0.5,
                    factors: Vec::new(),
                    explanation: String::new(),
                },
                rank: Some(1),
            },
        }];
        let date = NaiveDate::from_ymd_opt(2025, 10, 14).unwrap();
        assert!(matches!(
            g.generate(&sel, 5, date).await,
            Err(GenerationError::MissingApiKey(ref env)) if env == "NEWSRANK_TEST_MISSING_KEY"
        ));
    }
}
