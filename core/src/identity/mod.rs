// Identity token: what a device broadcasts about itself
//
// A token pairs the protocol's app tag (which app generation emitted the
// broadcast) with the user identifier being announced. Tokens are built once
// when broadcasting starts and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity announced in a single advertisement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken {
    /// Protocol/app tag: a canonical UUID for manufacturer-data payloads,
    /// a short text tag for local-name payloads
    pub app_tag: String,
    /// User identifier announced by the broadcaster
    pub user_id: String,
}

impl IdentityToken {
    /// Create a new identity token
    pub fn new(app_tag: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_tag: app_tag.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.app_tag, self.user_id)
    }
}
