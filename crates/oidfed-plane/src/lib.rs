//! OpenID Federation Entity Server
//!
//! A federation entity (trust anchor or intermediate) that:
//! - Publishes its signed entity configuration
//! - Issues statements about its registered subordinates
//! - Resolves subjects to trust anchors on behalf of clients
//!
//! ## API Endpoints
//!
//! ### Federation Endpoints
//! - `GET /.well-known/openid-federation` - Entity configuration
//! - `GET /fetch?sub=` - Subordinate statement
//! - `GET /list` - Subordinate identifiers (optional `entity_type` filter)
//! - `GET /resolve?sub=&trust_anchor=` - Signed resolve response
//!
//! ### Management Endpoints
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check
//! - `POST /v1/subordinates` - Register a subordinate
//! - `GET /v1/subordinates` - List subordinates
//! - `DELETE /v1/subordinates/{entity_id}` - Unregister a subordinate
//! - `POST /v1/keys/rotate` - Rotate the signing key
//!
//! The `/v1` endpoints exist only when `OIDFED_ADMIN_TOKEN` is set and require
//! `Authorization: Bearer <token>`.

pub mod api;
pub mod config;
pub mod issuer;
pub mod keys;
pub mod provider;
pub mod storage;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{AdminToken, ConfigError, PlaneConfig};
pub use issuer::{IssueError, StatementIssuer};
pub use keys::KeyRegistry;
pub use provider::LocalProvider;
pub use storage::{MemoryStore, StorageError, SubordinateInfo, SubordinateStore};
