//! Secure token secret wrapper that redacts sensitive material.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::AccessClaims};

const FINGERPRINT_LEN: usize = 12;

/// Redacted access token wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Short, stable fingerprint safe to log or hand to observers.
	///
	/// The fingerprint is the leading characters of a base64 (no padding) SHA-256 digest,
	/// enough to tell two tokens apart without revealing either.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.0.as_bytes());

		let mut encoded = STANDARD_NO_PAD.encode(hasher.finalize());

		encoded.truncate(FINGERPRINT_LEN);

		encoded
	}

	/// Decodes the JWT payload without verifying it.
	///
	/// Returns `None` for opaque tokens. The claims are informational only; the services
	/// remain the authority on whether a token is valid.
	pub fn claims(&self) -> Option<AccessClaims> {
		AccessClaims::decode_unverified(&self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn fingerprint_is_stable_and_distinct() {
		let first = TokenSecret::new("token-one");
		let second = TokenSecret::new("token-two");

		assert_eq!(first.fingerprint(), TokenSecret::new("token-one").fingerprint());
		assert_ne!(first.fingerprint(), second.fingerprint());
		assert_eq!(first.fingerprint().len(), FINGERPRINT_LEN);
		assert!(!first.fingerprint().contains("token-one"));
	}

	#[test]
	fn bearer_prefixes_scheme() {
		assert_eq!(TokenSecret::new("abc").bearer(), "Bearer abc");
	}
}
