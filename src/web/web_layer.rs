// Web layer - the HTTP side of verification.

#[path = "pages.rs"]
pub mod pages;

#[path = "verify_server.rs"]
pub mod verify_server;

pub use verify_server::{router, serve, WebState};
