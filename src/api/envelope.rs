//! Response envelope shared by the backend services.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ResponseError};

const ACCESS_TOKEN_FIELD: &str = "accessToken";

/// `{ success, message, data }` wrapper around every service payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
	/// Business outcome flag; missing means success.
	#[serde(default = "default_success")]
	pub success: bool,
	/// Server-provided message.
	#[serde(default)]
	pub message: String,
	/// Payload, `null` when absent.
	#[serde(default)]
	pub data: serde_json::Value,
}
impl Envelope {
	/// Parses an envelope from a raw body.
	pub fn from_slice(body: &[u8], status: u16) -> Result<Self, ResponseError> {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Self::default());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ResponseError::Malformed { source, status })
	}

	/// Decodes `data` into `T`.
	pub fn into_data<T>(self, status: u16) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(self.data)
			.map_err(|source| ResponseError::Malformed { source, status })
	}

	/// Reads the access token issued in `data.accessToken`; an empty token counts as missing.
	pub fn access_token(&self, status: u16) -> Result<TokenSecret, ResponseError> {
		self.data_str(ACCESS_TOKEN_FIELD, status).map(TokenSecret::new)
	}

	/// Decodes `data.<field>` into `T`; a missing or `null` field yields `None`.
	pub fn data_field<T>(&self, field: &'static str, status: u16) -> Result<Option<T>, ResponseError>
	where
		T: DeserializeOwned,
	{
		match self.data.get(field) {
			None | Some(serde_json::Value::Null) => Ok(None),
			Some(value) => serde_path_to_error::deserialize(value)
				.map(Some)
				.map_err(|source| ResponseError::Malformed { source, status }),
		}
	}

	/// Returns the non-empty string at `data.<field>`.
	pub fn data_str(&self, field: &'static str, status: u16) -> Result<&str, ResponseError> {
		self.data
			.get(field)
			.and_then(|value| value.as_str())
			.filter(|value| !value.is_empty())
			.ok_or(ResponseError::MissingField { field, status })
	}
}
impl Default for Envelope {
	fn default() -> Self {
		Self { success: true, message: String::new(), data: serde_json::Value::Null }
	}
}

fn default_success() -> bool {
	true
}
