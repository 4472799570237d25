//! Student Portal - learning backend library
//!
//! - Email/password, sign-up and OAuth sign-in through Firebase (or demo
//!   accounts), with session records and route-guard cookies kept in sync
//! - A session watchdog that refreshes live sessions and signs out idle ones
//! - AI study flows (study tips, progress insights, smart notifications)
//!   with a fallback payload for every flow
//!
//! # Example
//!
//! ```ignore
//! use student_portal::{AuthBackend, AuthService, Config};
//! use student_portal::session::ClientInfo;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = AuthService::new(AuthBackend::Demo, &Config::default(), "secret");
//!     let mut ctx = auth.new_context(ClientInfo::default());
//!     let user = auth.sign_in(&mut ctx, "student@demo.com", "password123").await?;
//!     println!("{} ({})", user.display_name, user.role);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod session;
pub mod auth;
pub mod ai;
pub mod server;
pub mod cli;

pub use ai::{
    ChatModelClient,
    FlowOutcome,
    ModelClient,
};

pub use auth::{
    AuthBackend,
    AuthContext,
    AuthError,
    AuthService,
    AuthState,
    ReconcileOutcome,
};

pub use config::Config;

pub use types::{ProfileUpdate, SessionData, User, UserRole};

pub use server::{
    ServerState,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
