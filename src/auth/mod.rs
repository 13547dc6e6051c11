//! Token storage, expiry inspection, single-flight refresh and OTP login.

pub mod api;
pub mod error;
pub mod refresh;
pub mod store;
pub mod token;

pub use api::AuthApi;
pub use error::AuthError;
pub use refresh::{ObserverId, RefreshCoordinator, UnauthorizedObserver};
pub use store::{FileTokenPersistence, MemoryTokenPersistence, TokenPersistence, TokenStore};
pub use token::{access_token_expiry, is_access_token_fresh, TokenPair};
