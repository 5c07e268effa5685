use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new().route("/health", get(health)).route("/search", get(search)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct SearchParams {
	q: Option<String>,
}

async fn search(
	State(state): State<AppState>,
	Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
	let Some(q) = params.q else {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			"q is required.",
			Some(vec!["q".to_string()]),
		));
	};
	let hits = state.service.search(&q).await?;

	Ok(Json(hits))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<shelter_service::Error> for ApiError {
	fn from(err: shelter_service::Error) -> Self {
		match err {
			shelter_service::Error::InvalidRequest { message } => json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				message,
				Some(vec!["q".to_string()]),
			),
			err => {
				tracing::error!(error = %err, "Search request failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"search_failed",
					"Search backend failed.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
