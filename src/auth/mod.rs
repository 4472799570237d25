//! Authentication and session reconciliation
//!
//! Sign-in through the identity provider (or the demo accounts), session
//! records in the client's session store, cookies for the route guard, and
//! the watchdog that keeps all three consistent.

pub mod context;
pub mod cookies;
pub mod demo;
mod error;
pub mod firebase;
pub mod firestore;
pub mod identity;
pub mod profiles;
pub mod service;
pub mod watchdog;

pub use context::{AuthContext, AuthState};
pub use cookies::{Cookie, CookieBridge, CookieJar};
pub use error::AuthError;
pub use firebase::FirebaseIdentityProvider;
pub use firestore::FirestoreProfileStore;
pub use identity::{IdentityProvider, ProviderUser};
pub use profiles::{MemoryProfileStore, ProfileDocument, ProfileStore};
pub use service::{AuthBackend, AuthService, ReconcileOutcome};
pub use watchdog::{ClientRegistry, SessionWatchdog, SharedContext, SweepReport};
