/// Authentication module
///
/// Token codec, claims, roles, password verification, the persisted refresh
/// token store, the rotation protocol and the authorization guards.

pub mod claims;
pub mod guard;
pub mod jwt;
pub mod password;
pub mod refresh_token;
pub mod role;
pub mod service;

pub use claims::{Claims, TokenType};
pub use guard::{authorize, require_authenticated, AuthenticatedUser};
pub use jwt::{decode_token, encode_token, generate_access_token, generate_refresh_token};
pub use password::{hash_password, verify_password};
pub use role::{Permission, Role};
pub use service::TokenPair;
