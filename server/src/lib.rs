//! Edge server: the access check as a tower layer in front of a static page
//! server.

pub mod handlers;
pub mod state;
pub mod tower_middle;

pub use state::AppState;
