pub mod engine;
pub mod session;
pub mod version;

pub use engine::{build_router, ApiError, ApiResult, ApiState};
pub use version::VersionModel;
