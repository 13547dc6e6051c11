//! Homebase: authenticated HTTP session layer.
//!
//! Manages the access/refresh token pair, attaches bearer tokens to outbound
//! calls, refreshes an expired token with at most one refresh call in flight,
//! and drives the `Checking → Authenticated/Unauthenticated` session state.
//!
//! # Quick Start
//!
//! ```no_run
//! use homebase::prelude::*;
//!
//! # async fn example() -> homebase::error::Result<()> {
//! let client = SessionClient::new(SessionConfig::from_env())?;
//! if client.session().bootstrap().await == SessionStatus::Unauthenticated {
//!     client.auth().send_otp("+15550100").await?;
//!     let pair = client.auth().verify_otp("+15550100", "123456").await?;
//!     client.session().login(pair)?;
//! }
//! let households: serde_json::Value = client
//!     .pipeline()
//!     .execute_json(RequestDescriptor::get("/households"))
//!     .await?;
//! println!("{households}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod prelude;
pub mod session;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
