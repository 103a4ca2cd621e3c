//! Session command surface
//!
//! Async entry points the presentation layer calls. Each one is a message to
//! the session actor and resolves with the actor's answer.

pub mod session;

pub use session::SessionHandle;
