//! OAuth token lifecycle for the upstream platform.
//!
//! # State machine
//!
//! ```text
//!                 exchange_code
//! Unauthenticated ─────────────► Valid ──(now ≥ expires_at - skew)──► Expiring
//!                                  ▲                                     │
//!                                  │          refresh ok                 │
//!                                  └───────────────◄─────────────────────┤
//!                                  ▲                                     │
//!                 401 from API     │                                     │ refresh rejected
//!        Valid ──────────────► Invalid                                   ▼
//!                                                          ReauthorizationRequired
//! ```
//!
//! A token without expiry information stays `Valid` until the API answers
//! 401; see [`TokenManager::state_at`].

pub mod manager;
pub mod types;

pub use manager::{OAuthSettings, TokenManager, TokenPolicy, TokenState};
pub use types::TokenResponse;
