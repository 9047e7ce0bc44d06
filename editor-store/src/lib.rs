//! Editor Store - client state and synchronization for the code editor
//!
//! This crate owns "what the editor believes is true" versus "what the
//! execution API and data store have confirmed":
//!
//! - [`session::EditorSession`]: language, preferences, the last run and its
//!   normalized result, fed by the draft store and the execution gateway
//! - [`drafts::DraftStore`]: per-language buffers and preferences in durable
//!   key-value storage
//! - [`gateway::ExecutionGateway`]: one request per run, normalized into an
//!   [`gateway::ExecutionOutcome`]
//! - [`optimistic`]: the optimistic-toggle and confirm-then-apply combinators,
//!   instantiated by [`snippets`] (stars, deletes, sharing) and [`comments`]
//! - [`stats`]: read-only usage statistics for the profile view
//!
//! Remote collaborators sit behind traits ([`gateway::ExecutionApi`],
//! [`store::DataStore`], [`auth::IdentityService`],
//! [`storage::KeyValueStorage`]) with concrete adapters alongside.

pub mod auth;
pub mod comments;
pub mod config;
pub mod drafts;
pub mod editor;
pub mod gateway;
pub mod history;
pub mod local_identity;
pub mod notify;
pub mod optimistic;
pub mod session;
pub mod snippets;
pub mod sqlite;
pub mod stats;
pub mod storage;
pub mod store;

pub use session::{EditorSession, RunPhase, SessionSnapshot};
