//! Minimal Elasticsearch REST client: document upsert/delete by id and `query_string` search.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value};

use crate::{Error, Result};

pub struct ElasticClient {
	http: Client,
	base_url: String,
	index_prefix: String,
	username: Option<String>,
	password: Option<String>,
}
impl ElasticClient {
	pub fn new(cfg: &shelter_config::Elasticsearch) -> Result<Self> {
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		// Fail on an unusable base URL at startup rather than on the first event.
		crate::endpoint(&cfg.url, [])?;

		Ok(Self {
			http,
			base_url: cfg.url.clone(),
			index_prefix: cfg.index_prefix.clone(),
			username: cfg.username.clone(),
			password: cfg.password.clone(),
		})
	}

	pub fn index_prefix(&self) -> &str {
		&self.index_prefix
	}

	/// Creates or fully replaces the document stored under `doc_id`.
	pub async fn index_document(
		&self,
		index: &str,
		doc_id: &str,
		body: &Map<String, Value>,
	) -> Result<()> {
		let url = crate::endpoint(&self.base_url, [index, "_doc", doc_id])?;
		let res = self.authorize(self.http.put(url)).json(body).send().await?;

		res.error_for_status()?;

		Ok(())
	}

	/// Returns `false` when the document (or its index) did not exist.
	pub async fn delete_document(&self, index: &str, doc_id: &str) -> Result<bool> {
		let url = crate::endpoint(&self.base_url, [index, "_doc", doc_id])?;
		let res = self.authorize(self.http.delete(url)).send().await?;

		if res.status() == StatusCode::NOT_FOUND {
			return Ok(false);
		}

		res.error_for_status()?;

		Ok(true)
	}

	/// Runs `query` as a Lucene query string across every `<prefix>-*` index.
	pub async fn search(&self, query: &str) -> Result<Vec<Value>> {
		let pattern = format!("{}-*", self.index_prefix);
		let url = crate::endpoint(&self.base_url, [pattern.as_str(), "_search"])?;
		let body = search_body(query);
		let res = self.authorize(self.http.post(url)).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_search_response(json)
	}

	fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
		match &self.username {
			Some(username) => req.basic_auth(username, self.password.as_deref()),
			None => req,
		}
	}
}

fn search_body(query: &str) -> Value {
	serde_json::json!({ "query": { "query_string": { "query": query } } })
}

fn parse_search_response(json: Value) -> Result<Vec<Value>> {
	let hits = json
		.get("hits")
		.and_then(|hits| hits.get("hits"))
		.and_then(Value::as_array)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Search response is missing hits.hits array.".to_string(),
		})?;
	let mut sources = Vec::with_capacity(hits.len());

	for hit in hits {
		let source = hit.get("_source").cloned().ok_or_else(|| Error::InvalidResponse {
			message: "Search hit is missing _source.".to_string(),
		})?;

		sources.push(source);
	}

	Ok(sources)
}
