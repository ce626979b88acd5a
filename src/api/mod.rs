/// Request-facing helpers shared by the extractors
pub mod middleware;

pub use middleware::{extract_bearer_token, RequestContext};
