use super::ClientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ["mobile", "android", "iphone"].iter().any(|p| ua.contains(p)) {
            DeviceClass::Mobile
        } else if ua.contains("tablet") || ua.contains("ipad") {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Cache-only view of one logged-in token. Losing it on eviction is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub client_id: ClientId,
    pub token: String,
    pub login_time: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: DeviceClass,
    pub last_activity: DateTime<Utc>,
}

impl SessionData {
    pub fn start(
        client_id: ClientId,
        token: &str,
        ip_address: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Self {
        SessionData {
            client_id,
            token: token.to_owned(),
            login_time: now,
            ip_address: ip_address.to_owned(),
            user_agent: user_agent.to_owned(),
            device_type: DeviceClass::from_user_agent(user_agent),
            last_activity: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_class_follows_user_agent() {
        let cases = [
            ("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", DeviceClass::Mobile),
            ("Mozilla/5.0 (Linux; Android 14; Pixel 8)", DeviceClass::Mobile),
            ("Mozilla/5.0 (iPad; CPU OS 17_0)", DeviceClass::Tablet),
            ("SomeTablet/1.0", DeviceClass::Tablet),
            ("Mozilla/5.0 (X11; Linux x86_64)", DeviceClass::Desktop),
            ("", DeviceClass::Desktop),
        ];
        for (ua, expected) in cases {
            assert_eq!(DeviceClass::from_user_agent(ua), expected, "{ua}");
        }
    }
}
