//! Convenience re-exports for common use.

pub use crate::auth::{AuthApi, AuthError, TokenPair, TokenStore};
pub use crate::client::SessionClient;
pub use crate::config::SessionConfig;
pub use crate::error::{ApiError, ErrorKind, HomebaseError, Result};
pub use crate::http::{ApiResponse, RequestDescriptor, RequestPipeline};
pub use crate::session::{SessionBootstrapper, SessionStatus};
