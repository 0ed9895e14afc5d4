pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod oauth;
pub mod server;
pub mod store;

pub use config::{AuthConfig, CookieConfig, OAuthConfig};
pub use error::{AuthError, AuthResult};
pub use manager::{AuthSessionManager, PermissionGuard};
