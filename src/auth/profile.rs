//! User profile snapshot returned by the user service.

// self
use crate::_prelude::*;

/// Profile snapshot held by the session.
///
/// Fields the storefront does not model are kept in [`extra`](Self::extra) so a round trip
/// through the session never drops data the UI may display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
	/// User identifier.
	#[serde(alias = "_id")]
	pub id: String,
	/// Login email.
	pub email: String,
	/// Display name.
	#[serde(default)]
	pub full_name: Option<String>,
	/// Role (for example `customer` or `admin`).
	#[serde(default)]
	pub role: Option<String>,
	/// Remaining profile fields.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl UserProfile {
	/// Returns `true` when the profile carries the `admin` role.
	pub fn is_admin(&self) -> bool {
		self.role.as_deref().is_some_and(|role| role.eq_ignore_ascii_case("admin"))
	}
}
