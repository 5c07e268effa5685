pub mod elastic;
pub mod telegram;

mod error;

pub use error::{Error, Result};

use reqwest::Url;

/// Parses `base` and appends `segments` as individually percent-encoded path segments.
pub fn endpoint<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
	let mut url = Url::parse(base).map_err(|err| Error::InvalidConfig {
		message: format!("Invalid base URL {base:?}: {err}."),
	})?;

	url.path_segments_mut()
		.map_err(|()| Error::InvalidConfig {
			message: format!("Base URL {base:?} cannot carry a path."),
		})?
		.pop_if_empty()
		.extend(segments);

	Ok(url)
}
