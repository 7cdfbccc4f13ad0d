//! Domain services used by the HTTP routes and client-process callers.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the mapping from school-domain operations to backend
//! paths so route handlers can stay focused on protocol translation and cookie
//! plumbing. Every call runs through the authenticated request client.

pub mod resources;
