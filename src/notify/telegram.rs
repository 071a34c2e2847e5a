// src/notify/telegram.rs

//! Telegram Bot API channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::TelegramConfig;
use crate::notify::{ChannelError, NotifierChannel, OutboundMessage};
use crate::utils::http::create_api_client;

/// Cooldown assumed when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    url: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct BotUser {
    first_name: String,
    username: Option<String>,
}

/// Sends listing notifications to one chat through the Bot API.
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Ok(Self {
            client: create_api_client(config)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T, B>(&self, method: &str, body: Option<&B>) -> std::result::Result<T, ChannelError>
    where
        T: for<'de> Deserialize<'de> + Send,
        B: Serialize + ?Sized + Sync,
    {
        let request = match body {
            Some(body) => self.client.post(self.method_url(method)).json(body),
            None => self.client.get(self.method_url(method)),
        };
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        let parsed: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                let snippet: String = text.chars().take(200).collect();
                return Err(classify(status, snippet, None));
            }
        };

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } if (200..300).contains(&status) => Ok(result),
            failed => Err(classify(
                failed.error_code.unwrap_or(status),
                failed.description.unwrap_or_default(),
                failed.parameters.and_then(|p| p.retry_after),
            )),
        }
    }
}

#[async_trait]
impl NotifierChannel for TelegramChannel {
    async fn deliver(&self, message: &OutboundMessage) -> std::result::Result<(), ChannelError> {
        let reply_markup = (!message.actions.is_empty()).then(|| InlineKeyboardMarkup {
            inline_keyboard: vec![
                message
                    .actions
                    .iter()
                    .map(|action| InlineKeyboardButton {
                        text: &action.label,
                        url: &action.url,
                    })
                    .collect(),
            ],
        });
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &message.text,
            parse_mode: message.rich.then_some("MarkdownV2"),
            disable_web_page_preview: false,
            reply_markup,
        };

        self.call::<IgnoredAny, _>("sendMessage", Some(&request))
            .await
            .map(|_| ())
    }

    async fn identity_probe(&self) -> std::result::Result<String, ChannelError> {
        let bot: BotUser = self.call::<_, ()>("getMe", None).await?;
        Ok(match bot.username {
            Some(username) => format!("@{username}"),
            None => bot.first_name,
        })
    }
}

/// Map an API error code to a channel error classification.
fn classify(code: u16, description: String, retry_after: Option<u64>) -> ChannelError {
    match code {
        429 => ChannelError::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        },
        400 => ChannelError::Rejected(description),
        401 | 403 | 404 => ChannelError::Fatal(format!("{code}: {description}")),
        500..=599 => ChannelError::Timeout(format!("{code}: {description}")),
        _ => ChannelError::Unknown(format!("{code}: {description}")),
    }
}

/// Map a transport failure, keeping the token-bearing URL out of the message.
fn transport_error(e: reqwest::Error) -> ChannelError {
    let transient = e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
    let e = e.without_url();
    if transient {
        ChannelError::Timeout(e.to_string())
    } else {
        ChannelError::Unknown(e.to_string())
    }
}
