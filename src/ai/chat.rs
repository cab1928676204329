use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::AiClient;
use crate::config::AiConfig;
use crate::error::ApiError;
use crate::models::{Difficulty, FlashcardDraft, QuestionDraft};

/// Characters of source material sent per request.
pub const MAX_INPUT_CHARS: usize = 24_000;

const SUMMARY_PROMPT: &str = "You are a study assistant. Summarize the student's course material \
into a clear, well-structured study summary. Keep every key concept, definition, formula and \
example. Use short paragraphs and bullet points where they help. Reply with the summary only.";

const FLASHCARD_PROMPT: &str = "You are a study assistant that writes flashcards. Reply with a JSON \
object of the form {\"flashcards\": [{\"term\": \"...\", \"definition\": \"...\"}]} and nothing else.";

const QUIZ_PROMPT: &str = "You are a study assistant that writes multiple-choice quizzes. Reply with \
a JSON object of the form {\"questions\": [{\"question\": \"...\", \"choices\": [\"...\"], \
\"correct_index\": 0}]} and nothing else. Each question has between 2 and 6 choices and \
correct_index is the zero-based index of the right choice.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlashcardPayload {
    Wrapped { flashcards: Vec<FlashcardDraft> },
    Bare(Vec<FlashcardDraft>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuizPayload {
    Wrapped { questions: Vec<QuestionDraft> },
    Bare(Vec<QuestionDraft>),
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(ChatCompletionsClient { http, config })
    }

    async fn complete(&self, system_prompt: &str, user_prompt: String, json_output: bool) -> Result<String, ApiError> {
        if self.config.api_key.is_empty() {
            return Err(ApiError::upstream("AI API key is not configured"));
        }

        let mut body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "stream": false,
        });
        if json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
                .map_err(|_| ApiError::upstream("AI API key is not a valid header value"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(model = %self.config.model, json_output, "Sending chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("AI request failed: {}", e);
                ApiError::upstream(format!("AI request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("AI service returned {}: {}", status, text);
            return Err(ApiError::upstream(format!("AI service returned {}", status)));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!("AI response could not be parsed: {}", e);
            ApiError::upstream(format!("AI response could not be parsed: {}", e))
        })?;

        first_message(parsed)
    }
}

#[async_trait]
impl AiClient for ChatCompletionsClient {
    async fn summarize(&self, text: &str) -> Result<String, ApiError> {
        let prompt = format!("Course material:\n\n{}", truncate_chars(text, MAX_INPUT_CHARS));
        let summary = self.complete(SUMMARY_PROMPT, prompt, false).await?;
        info!(chars = summary.len(), "Generated summary");
        Ok(summary)
    }

    async fn flashcards(&self, summary: &str, count: u32) -> Result<Vec<FlashcardDraft>, ApiError> {
        let prompt = format!(
            "Write exactly {} flashcards covering the most important ideas of this summary:\n\n{}",
            count,
            truncate_chars(summary, MAX_INPUT_CHARS)
        );
        let content = self.complete(FLASHCARD_PROMPT, prompt, true).await?;
        let cards = parse_flashcards(&content, count as usize)?;
        info!(count = cards.len(), "Generated flashcards");
        Ok(cards)
    }

    async fn quiz(
        &self,
        summary: &str,
        difficulty: Difficulty,
        num_questions: u32,
    ) -> Result<Vec<QuestionDraft>, ApiError> {
        let prompt = format!(
            "Write exactly {} {} multiple-choice questions testing this summary:\n\n{}",
            num_questions,
            difficulty,
            truncate_chars(summary, MAX_INPUT_CHARS)
        );
        let content = self.complete(QUIZ_PROMPT, prompt, true).await?;
        let questions = parse_questions(&content, num_questions as usize)?;
        info!(count = questions.len(), %difficulty, "Generated quiz questions");
        Ok(questions)
    }
}

fn first_message(response: ChatResponse) -> Result<String, ApiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ApiError::upstream("AI response contained no message content"))
}

/// Cuts `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Removes a surrounding Markdown code fence such as ```` ```json ... ``` ````.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // drop the info string (e.g. "json") on the opening line
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };

    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_json(content: &str) -> Result<Value, ApiError> {
    serde_json::from_str(strip_code_fences(content)).map_err(|e| {
        error!("AI returned invalid JSON: {}", e);
        ApiError::upstream(format!("AI returned invalid JSON: {}", e))
    })
}

pub fn parse_flashcards(content: &str, limit: usize) -> Result<Vec<FlashcardDraft>, ApiError> {
    let payload: FlashcardPayload = serde_json::from_value(parse_json(content)?)
        .map_err(|e| ApiError::upstream(format!("AI flashcards have an unexpected shape: {}", e)))?;

    let mut cards = match payload {
        FlashcardPayload::Wrapped { flashcards } => flashcards,
        FlashcardPayload::Bare(cards) => cards,
    };

    cards.truncate(limit);
    if cards.is_empty() {
        return Err(ApiError::upstream("AI returned no flashcards"));
    }

    for card in cards.iter_mut() {
        card.validate().map_err(ApiError::upstream)?;
        card.term = card.term.trim().to_string();
        card.definition = card.definition.trim().to_string();
    }

    Ok(cards)
}

pub fn parse_questions(content: &str, limit: usize) -> Result<Vec<QuestionDraft>, ApiError> {
    let payload: QuizPayload = serde_json::from_value(parse_json(content)?)
        .map_err(|e| ApiError::upstream(format!("AI quiz has an unexpected shape: {}", e)))?;

    let mut questions = match payload {
        QuizPayload::Wrapped { questions } => questions,
        QuizPayload::Bare(questions) => questions,
    };

    questions.truncate(limit);
    if questions.is_empty() {
        return Err(ApiError::upstream("AI returned no quiz questions"));
    }

    for question in questions.iter() {
        question.validate().map_err(ApiError::upstream)?;
    }

    Ok(questions)
}
