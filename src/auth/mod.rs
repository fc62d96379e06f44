//! API-key authentication: key minting, Bearer middleware, caller identity.

pub mod api_key;
pub mod middleware;
pub mod models;

pub use api_key::{generate_api_key, generate_claim_code, generate_verification_code};
pub use middleware::ApiKeyAuth;
pub use models::AuthAgent;
