pub mod embedding;

use color_eyre::{Result, eyre};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

/// Bearer token followed by the provider's `default_headers`, which must all be strings.
pub fn provider_headers(api_key: &str, extra: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::with_capacity(extra.len() + 1);
	let mut bearer = HeaderValue::try_from(format!("Bearer {api_key}"))?;

	bearer.set_sensitive(true);
	headers.insert(AUTHORIZATION, bearer);

	for (name, value) in extra {
		let Value::String(value) = value else {
			return Err(eyre::eyre!("Provider header `{name}` must be a string, got {value}."));
		};

		let name = HeaderName::try_from(name.as_str())?;

		headers.insert(name, HeaderValue::try_from(value.as_str())?);
	}

	Ok(headers)
}
