//! `kata-api` — HTTP adapter for the identity/session/authorization core.
//!
//! Maps the core's typed outcomes to status codes, carries the refresh token
//! exclusively in an HttpOnly cookie, and derives the request identity from
//! bearer access tokens.

pub mod app;
pub mod context;
pub mod cookie;
pub mod middleware;
