pub mod http_client;
pub mod state_store;

/// Re-export commonly used types from ports
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use state_store::{StateStore, StateStoreError, StateStoreResult};
