pub mod auth;
pub mod client;

pub use client::Api;

/// Response code meaning the call succeeded (some endpoints use 0, some 200).
pub const CODE_OK: i64 = 200;
pub const CODE_OK_ALT: i64 = 0;
/// Session token expired; re-login and retry.
pub const CODE_SESSION_EXPIRED: i64 = 6069;
/// Server-side network exception; transient, retry with delay.
pub const CODE_NETWORK_EXCEPTION: i64 = 9007;
