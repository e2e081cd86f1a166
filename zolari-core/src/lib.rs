//! # Zolari Core
//!
//! Core library for the Zolari research client.
//! Provides the identity session, the research service client, the
//! application controller with its refresh loop, text views, configuration,
//! and fundamental types.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod research;
pub mod session;
pub mod types;
pub mod view;

// Re-export commonly used types at the crate root.
pub use config::ZolariConfig;
pub use controller::{AppController, AppState, AuthState, FormMessage};
pub use credentials::{CredentialStore, InMemoryCredentialStore, KeyringCredentialStore};
pub use error::{AuthError, FetchError, Result, SubmissionError, ZolariError};
pub use research::{ResearchClient, ResultFetcher, SubmissionGateway};
pub use session::{Authenticator, SessionManager};
pub use types::{
    Depth, ResearchDraft, ResearchRequestPayload, ResearchResult, ResearchStatus, ResearchType,
    Urgency, UserProfile,
};
