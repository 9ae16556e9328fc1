//! The cookie jar shape shared between the browser driver and the
//! session-cookie fan-out (§4.6).

use serde::{Deserialize, Serialize};

/// A single browser cookie, the JSON element type of `session/cookies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// The JSON shape of the `session/cookies` coordinator value.
pub type CookieJar = Vec<Cookie>;
