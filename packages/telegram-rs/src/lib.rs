//! Thin Telegram Bot API client: sending terminal job notifications,
//! delivering repository archives as documents, and resolving uploaded
//! file ids to download URLs.

use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

pub mod models;

use crate::models::{ApiResponse, File, Message};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    /// Bot API answered `ok: false`.
    #[error("telegram api error{}: {description}", error_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        error_code: Option<i64>,
        description: String,
    },

    /// `ok: true` but the expected result payload was missing.
    #[error("telegram response missing result")]
    EmptyResult,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct TelegramOptions {
    pub bot_token: String,
    /// Override for tests against a stub server.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramService {
    options: TelegramOptions,
    http: Client,
    api_base: String,
}

impl TelegramService {
    pub fn new(options: TelegramOptions) -> Self {
        let api_base = options
            .api_base
            .clone()
            .unwrap_or_else(|| API_BASE.to_string());
        Self {
            options,
            http: Client::new(),
            api_base,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base, self.options.bot_token, method
        )
    }

    fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T, TelegramError> {
        if !response.ok {
            return Err(TelegramError::Api {
                error_code: response.error_code,
                description: response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        response.result.ok_or(TelegramError::EmptyResult)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let body = response.json::<ApiResponse<T>>().await?;
        Self::unwrap_response(body)
    }

    /// Send a Markdown-formatted message to a chat.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TelegramError> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Send raw bytes as a document attachment with a caption.
    pub async fn send_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<Message, TelegramError> {
        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown".to_string())
            .part("document", part);

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Resolve a file id to a direct download URL.
    pub async fn get_file_link(&self, file_id: &str) -> Result<String, TelegramError> {
        let response = self
            .http
            .post(self.method_url("getFile"))
            .json(&json!({ "file_id": file_id }))
            .send()
            .await?;
        let file: File = Self::decode(response).await?;
        let path = file.file_path.ok_or(TelegramError::EmptyResult)?;
        Ok(format!(
            "{}/file/bot{}/{}",
            self.api_base, self.options.bot_token, path
        ))
    }
}
