//! Client SDK for the blueprint support-policy service.
//!
//! Two stores sit on top of a shared [`api::ApiClient`]:
//!
//! - [`session::SessionStore`] — member login/registration, identity derived
//!   from the bearer token, email verification, logout.
//! - [`policy::PolicyStore`] — the fetched policy list, the currently viewed
//!   policy detail and client-side filtering by region/job/age/income/name.
//!
//! The session token is the only state that survives restarts; it is kept in
//! a [`storage::KeyValueStore`] supplied by the caller.

pub mod api;
pub mod error;
pub mod policy;
pub mod session;
pub mod storage;
pub mod token;

pub use api::ApiClient;
pub use error::{Error, Result};
pub use policy::{FilterCriteria, PolicyDetail, PolicyStore, PolicySummary};
pub use session::{AuthFailure, Member, MemberRegistration, Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::{Claims, TokenError};
