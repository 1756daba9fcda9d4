pub mod auth;
pub mod response;

pub use auth::{populate_auth, populate_user, AuthState, CurrentUser};
pub use response::ApiResponse;
