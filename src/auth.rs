//! Auth-domain models: access token secrets, their unverified claims, and user profiles.

pub mod claims;
pub mod profile;
pub mod secret;

pub use claims::*;
pub use profile::*;
pub use secret::*;
