pub mod api;
pub mod jwt;
pub mod server_config;

pub use self::api::{
    AuthResponse, ProfileResponse, SubscriptionRecord, SubscriptionStatusResponse,
};
pub use self::jwt::{Claims, Role};
pub use self::server_config::{AppConfig, ConfigError};
