//! Harmonizer REST Service
//!
//! ## Endpoints
//!
//! - `GET /health` - Status probe
//! - `POST /harmonize/plan` - Reconcile manifests, no remote writes
//! - `POST /harmonize/apply` - Reconcile, harmonize and open a pull request
//! - `POST /api/code-harmonizer/preview` - Group shared source files and propose unifications
//! - `POST /harmonize/preview` - Alias of the above
//! - `POST /api/code-harmonizer/apply` - Write accepted unifications into a local component
//!
//! Every failure answers 500 with `{ok: false, error}`. Unparseable bodies
//! are read as an empty object.

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, normalize_path, request_logging_middleware, REQUEST_ID_HEADER};
pub use routes::{create_router, ErrorResponse, TargetComponent};
pub use state::ServiceState;
