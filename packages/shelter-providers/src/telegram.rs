use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::{Error, Result};

pub struct TelegramClient {
	http: Client,
	api_base: String,
	api_key: String,
}
impl TelegramClient {
	pub fn new(cfg: &shelter_config::Notifications) -> Result<Self> {
		let api_key = cfg.api_key.clone().ok_or_else(|| Error::InvalidConfig {
			message: "notifications.api_key is required to build the Telegram client.".to_string(),
		})?;
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { http, api_base: cfg.api_base.clone(), api_key })
	}

	pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
		let token_segment = format!("bot{}", self.api_key);
		let url = crate::endpoint(&self.api_base, [token_segment.as_str(), "sendMessage"])?;
		let body = serde_json::json!({ "chat_id": chat_id, "text": text });
		// The request URL embeds the bot token, so it is stripped from transport errors.
		let res =
			self.http.post(url).json(&body).send().await.map_err(reqwest::Error::without_url)?;
		let raw = res.bytes().await.map_err(reqwest::Error::without_url)?;

		parse_send_response(&raw)
	}
}

pub fn format_message(source: &str, level: &str, raw_log: &str) -> String {
	format!("Notification from \"{source}\"!\n[{level}]\nLOG:{raw_log}")
}

#[derive(Deserialize)]
struct SendResponse {
	ok: bool,
	description: Option<String>,
}

fn parse_send_response(raw: &[u8]) -> Result<()> {
	let res: SendResponse = serde_json::from_slice(raw)?;

	if res.ok {
		return Ok(());
	}

	Err(Error::InvalidResponse {
		message: format!(
			"Telegram rejected the message: {}.",
			res.description.as_deref().unwrap_or("no description")
		),
	})
}
