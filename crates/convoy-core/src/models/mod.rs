pub mod error;
pub mod manifest;

pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use manifest::{VersionInfo, VersionManifest};
