//! Key layout of the cache tier. Other tooling reads these keys, so the
//! patterns must stay stable.

use crate::domain_model::{ClientId, LimitClass};

pub fn access_token(token: &str) -> String {
    format!("token:access:{token}")
}

pub fn refresh_token(token: &str) -> String {
    format!("token:refresh:{token}")
}

pub fn blacklist(token: &str) -> String {
    format!("blacklist:token:{token}")
}

pub fn session(client_id: &ClientId, token: &str) -> String {
    format!("session:{client_id}:{token}")
}

pub fn session_prefix(client_id: &ClientId) -> String {
    format!("session:{client_id}:")
}

pub fn client(client_id: &ClientId) -> String {
    format!("client:{client_id}")
}

pub fn rate_limit(class: LimitClass, ip: &str) -> String {
    format!("ratelimit:{class}:{ip}")
}
