//! Unverified JWT claim inspection for access tokens.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Subset of access token claims the storefront cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
	/// Subject (user identifier).
	#[serde(default)]
	pub sub: Option<String>,
	/// Expiry as seconds since the Unix epoch.
	#[serde(default)]
	pub exp: Option<i64>,
	/// Issued-at as seconds since the Unix epoch.
	#[serde(default)]
	pub iat: Option<i64>,
	/// Role claim issued by the user service.
	#[serde(default)]
	pub role: Option<String>,
}
impl AccessClaims {
	/// Decodes the payload segment of a compact JWT without checking its signature.
	pub fn decode_unverified(token: &str) -> Option<Self> {
		let mut segments = token.split('.');
		let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

		if segments.next().is_some() {
			return None;
		}

		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

		serde_json::from_slice(&bytes).ok()
	}

	/// Expiry instant, when the `exp` claim is present and in range.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.exp.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
	}
}
