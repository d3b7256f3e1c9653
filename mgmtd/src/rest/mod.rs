//! RESTCONF front end. Stateless: every write is one `apply_direct` batch
//! against the running tree.

mod handlers;
mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::{ApiDoc, create_router};
