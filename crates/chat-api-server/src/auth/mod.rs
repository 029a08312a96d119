pub mod jwt;
pub mod middleware;

pub use jwt::JwtManager;
pub use middleware::{auth_middleware, AuthUser};
