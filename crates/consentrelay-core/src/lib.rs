pub mod config;
mod error;
pub mod fhir;
pub mod mapper;
pub mod merge;
pub mod notification;
pub mod period;
pub mod profile;
pub mod registry;

pub use config::{AppConfig, ConfigError};
pub use error::TransformError;
pub use mapper::{CanonicalRecord, ConsentMapper, record_id};
pub use notification::{Notification, SignerId};
pub use period::normalize_period;
pub use registry::{PolicyRegistry, RegistryError, StaticRegistry};
