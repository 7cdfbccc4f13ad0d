//! Client-side state.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` tracks who is signed in for code running in the client process.
//! It owns no tokens itself; the token store behind its `ApiClient` is the
//! source of truth.

pub mod session;
