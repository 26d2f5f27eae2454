//! Service identity endpoint.

use axum::extract::State;
use axum::http::Method;
use axum::Json;
use serde_json::{json, Value};

use crate::api::engine::{method_not_implemented, ApiError, ApiState};

pub const VIEW_NAME: &str = "VersionApiView";

#[derive(Debug, Clone)]
pub struct VersionModel {
    pub product_name: String,
    pub software_version: String,
    pub hardware_version: String,
}

impl Default for VersionModel {
    fn default() -> Self {
        Self {
            product_name: "hark audio search service".into(),
            software_version: env!("CARGO_PKG_VERSION").into(),
            hardware_version: "1.0.0".into(),
        }
    }
}

impl VersionModel {
    pub fn to_json(&self) -> Value {
        json!({
            "ProductName": self.product_name,
            "SoftwareVersion": self.software_version,
            "HardwareVersion": self.hardware_version,
            "result": "ok",
        })
    }
}

pub async fn get_version(State(state): State<ApiState>) -> Json<Value> {
    Json(state.version.to_json())
}

pub async fn method_fallback(method: Method) -> ApiError {
    method_not_implemented(&method, VIEW_NAME)
}
