//! Session credential renewal
//!
//! The chat transport authenticates with a long-lived session credential that
//! embeds its own expiry. Once a day the renewal task checks that expiry and,
//! inside the renewal window, trades the credential for a fresh one:
//!
//! 1. issue an access token under the current credential
//! 2. log in anonymously with that token; the response cookie is the new credential
//!
//! The new value is published to every reader and written back to the env file.

pub mod claims;
pub mod renewal;
pub mod store;

pub use claims::{expires_at, fingerprint};
pub use renewal::{CredentialRenewal, RenewalConfig, RenewalOutcome, needs_renewal};
pub use store::{persist_credential, upsert_line};
