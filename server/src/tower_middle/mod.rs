/// Tower middleware module
///
/// The edge access check runs here, in front of the page server, and reads
/// nothing but the request's cookie.
pub mod cookie_view;
pub mod edge_guard;

pub use cookie_view::CookieView;
pub use edge_guard::{EdgeGuard, EdgeGuardLayer, EdgeGuardService, EdgeOutcome};
