// src/config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub room_provider: RoomProviderConfig,
}

/// 100ms-style room provider credentials. All optional: missing credentials
/// degrade calls to signaling-only, they never block call creation.
#[derive(Debug, Clone, Default)]
pub struct RoomProviderConfig {
    pub api_base: String,
    pub management_token: String,
    pub template_id: String,
    pub token_role: String,
}

impl RoomProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.management_token.is_empty() && !self.template_id.is_empty()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        Ok(Config {
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "production".to_string()),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "9000".to_string())
                .parse()?,
            room_provider: RoomProviderConfig {
                api_base: env::var("ROOM_API_BASE")
                    .unwrap_or_else(|_| "https://api.100ms.live/v2".to_string()),
                management_token: env::var("ROOM_MANAGEMENT_TOKEN").unwrap_or_default(),
                template_id: env::var("ROOM_TEMPLATE_ID").unwrap_or_default(),
                token_role: env::var("ROOM_TOKEN_ROLE")
                    .unwrap_or_else(|_| "host".to_string()),
            },
        })
    }
}
