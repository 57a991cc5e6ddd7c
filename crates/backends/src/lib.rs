//! Model backend implementations for quill.
//!
//! All backends implement the `quill_core::ModelBackend` trait. The router
//! builds the configured set and selects the active one; the retry wrapper
//! adds bounded backoff around transient failures.

pub mod local;
pub mod remote;
pub mod retry;
pub mod router;

pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use retry::RetryBackend;
pub use router::BackendRouter;
