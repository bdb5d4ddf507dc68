pub mod csrf;

pub use csrf::{csrf_middleware, session_token, CsrfToken};
