// Object store side of the pipeline: backend selection and the OpenDAL transport

pub mod storage_config;
pub mod transport;

pub use storage_config::{BackendConfig, CloudBackend, LocalBackend};
pub use transport::ObjectStoreTransport;
