//! Authentication module

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, JwtManager, SupabaseClaims};
pub use middleware::{
    authenticate, extract_bearer_token, require_auth, require_plan_change_auth, AuthError,
    AuthState,
};
