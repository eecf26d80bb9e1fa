use std::time::Duration;

use storechat_types::models::UserId;

use crate::error::{Result, SyncError};

pub const DEFAULT_AVATAR: &str = "/images/default-avatar.png";

/// Runtime settings for a chat session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST service, without trailing slash.
    pub api_url: String,
    /// WebSocket URL of the chat gateway.
    pub gateway_url: String,
    /// Bearer token for both REST and gateway; acquired elsewhere.
    pub token: Option<String>,
    /// Local identity. Sends and read acknowledgements are no-ops without it.
    pub user_id: Option<UserId>,
    pub room_list_limit: u32,
    pub history_limit: u32,
    pub default_avatar: String,
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".into(),
            gateway_url: "ws://127.0.0.1:3000/gateway".into(),
            token: None,
            user_id: None,
            room_list_limit: 50,
            history_limit: 50,
            default_avatar: DEFAULT_AVATAR.into(),
            reconnect_delay: Duration::from_millis(2000),
        }
    }
}

impl SyncConfig {
    /// Read `STORECHAT_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let reconnect_ms: u64 =
            parse_or(get("STORECHAT_RECONNECT_MS"), "STORECHAT_RECONNECT_MS", 2000)?;

        Ok(Self {
            api_url: get("STORECHAT_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            gateway_url: get("STORECHAT_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            token: get("STORECHAT_TOKEN"),
            user_id: get("STORECHAT_USER_ID")
                .map(|v| {
                    v.trim()
                        .parse::<UserId>()
                        .map_err(|e| SyncError::Config(format!("STORECHAT_USER_ID: {}", e)))
                })
                .transpose()?,
            room_list_limit: parse_or(
                get("STORECHAT_ROOM_LIMIT"),
                "STORECHAT_ROOM_LIMIT",
                defaults.room_list_limit,
            )?,
            history_limit: parse_or(
                get("STORECHAT_HISTORY_LIMIT"),
                "STORECHAT_HISTORY_LIMIT",
                defaults.history_limit,
            )?,
            default_avatar: get("STORECHAT_DEFAULT_AVATAR").unwrap_or(defaults.default_avatar),
            reconnect_delay: Duration::from_millis(reconnect_ms),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.default_avatar, DEFAULT_AVATAR);
        assert!(config.user_id.is_none());
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn overrides_and_trailing_slash() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("STORECHAT_API_URL", "https://shop.example/api/"),
            ("STORECHAT_USER_ID", "17"),
            ("STORECHAT_ROOM_LIMIT", "20"),
            ("STORECHAT_RECONNECT_MS", "500"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://shop.example/api");
        assert_eq!(config.user_id, Some(17));
        assert_eq!(config.room_list_limit, 20);
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err =
            SyncConfig::from_lookup(lookup(&[("STORECHAT_HISTORY_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
