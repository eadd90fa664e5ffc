use serde::{Deserialize, Serialize};

use crate::util::{sanitize_text, truncate_chars};

const MAX_USER_AGENT_LEN: usize = 200;

/// Browser/device details reported by the checkout page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientInfo {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen_size: String,
    /// Client clock in millis
    pub timestamp: i64,
    pub referrer: String,
    pub is_secure: bool,
    pub has_cookies: bool,
}

impl ClientInfo {
    /// Copy with every string field sanitized and an empty referrer shown as "direct".
    pub fn sanitized(&self) -> Self {
        let referrer = sanitize_text(&self.referrer);
        Self {
            user_agent: sanitize_text(&truncate_chars(&self.user_agent, MAX_USER_AGENT_LEN)),
            language: sanitize_text(&self.language),
            platform: sanitize_text(&self.platform),
            screen_size: sanitize_text(&self.screen_size),
            timestamp: self.timestamp,
            referrer: if referrer.is_empty() {
                "direct".to_string()
            } else {
                referrer
            },
            is_secure: self.is_secure,
            has_cookies: self.has_cookies,
        }
    }
}
