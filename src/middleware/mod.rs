/// Middleware module
///
/// The per-request authenticator and request logging.

mod auth_middleware;
mod request_logging;

pub use auth_middleware::AuthMiddleware;
pub use request_logging::RequestLogging;
