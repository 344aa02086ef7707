//! Cairn Authentication and Authorization
//!
//! This crate provides:
//! - The [`Authenticator`] contract the dispatcher calls for every request
//! - Authorization request contexts
//! - A builtin SigV4 authenticator over locally configured accounts
//! - A client for a remote authority ("vault")
//!
//! # Example
//!
//! ```rust,ignore
//! use cairn_auth::{AllowAllEvaluator, BuiltinAuthenticator, CredentialStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(CredentialStore::from_accounts(&config.auth.accounts));
//! let auth = BuiltinAuthenticator::new(store, "us-east-1", Arc::new(AllowAllEvaluator));
//! // let outcome = auth.do_auth(&request, Some(&contexts)).await?;
//! ```

pub mod authenticator;
pub mod builtin;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod identity;
pub mod sigv4;
pub mod store;
pub mod vault;

pub use authenticator::{AuthRequest, Authenticator, STREAMING_PAYLOAD};
pub use builtin::BuiltinAuthenticator;
pub use context::RequestContext;
pub use error::AuthError;
pub use evaluator::{AllowAllEvaluator, ContextEvaluator, Decision, DenyAllEvaluator};
pub use identity::{AuthInfo, AuthOutcome, AuthorizationResult, StreamingV4Params};
pub use sigv4::SigV4Verifier;
pub use store::CredentialStore;
pub use vault::{VaultAuthenticator, VaultConfig};
