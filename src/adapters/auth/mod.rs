//! Authentication adapters.
//!
//! Implementations of the `SessionValidator` port:
//!
//! - `jwt` - HS256 dashboard tokens signed with a shared secret
//! - `mock` - Test implementation that doesn't require real tokens

mod jwt;
mod mock;

pub use jwt::{JwtSessionValidator, SessionClaims};
pub use mock::MockSessionValidator;
