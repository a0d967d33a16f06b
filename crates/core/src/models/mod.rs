//! Data models for PrepDeck

mod logout;
mod session;
mod user;

pub use logout::*;
pub use session::*;
pub use user::*;
