pub mod format;
pub mod query;

pub use format::{Envelope, Status};
pub use query::parse_query;
