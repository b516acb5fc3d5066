//! Alpaca Conform Common Library
//!
//! Wire-level vocabulary shared by the conformance engine and the CLI:
//! request parameters, expected status sets, the decoded response envelope,
//! outcome severities, device types and the ImageBytes frame decoder.

pub mod error;
pub mod image_bytes;
pub mod types;

pub use error::{Error, Result};
pub use image_bytes::{ArrayMetadataV1, ImageBytesFrame};
pub use types::*;

/// Alpaca Conform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name sent in the User-Agent header
pub const USER_AGENT_PRODUCT_NAME: &str = "AlpacaConform";

/// Correctly cased client identifier parameter name
pub const CLIENT_ID: &str = "ClientID";

/// Correctly cased client transaction identifier parameter name
pub const CLIENT_TRANSACTION_ID: &str = "ClientTransactionID";

pub const APPLICATION_JSON_MIME_TYPE: &str = "application/json";
pub const IMAGE_BYTES_MIME_TYPE: &str = "application/imagebytes";

/// Header asking the device to hand image arrays off as base64 text
pub const BASE64_HANDOFF_HEADER: &str = "base64handoff";
pub const BASE64_HANDOFF_SUPPORTED: &str = "true";

/// Root of every versioned Alpaca device URL
pub const API_ROOT: &str = "/api/v1";

/// User agent string in `product/version` form
pub fn user_agent() -> String {
    format!("{}/{}", USER_AGENT_PRODUCT_NAME, VERSION)
}

/// Path of a device member below the host, e.g. `/api/v1/focuser/0/position`
pub fn device_member_path(device_type: DeviceType, device_number: u32, member: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        API_ROOT,
        device_type.api_name(),
        device_number,
        member.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_path_is_lower_case() {
        assert_eq!(
            device_member_path(DeviceType::FilterWheel, 2, "FocusOffsets"),
            "/api/v1/filterwheel/2/focusoffsets"
        );
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert_eq!(user_agent(), format!("AlpacaConform/{}", VERSION));
    }
}
