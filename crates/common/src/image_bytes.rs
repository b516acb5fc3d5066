//! ImageBytes binary frame decoding
//!
//! Large array members may answer with `application/imagebytes` instead of
//! JSON. The frame starts with a little-endian metadata header whose first
//! field is a version number. Version 1 is the only layout defined:
//!
//! ```text
//! offset  field                      type
//!      0  MetadataVersion            i32
//!      4  ErrorNumber                i32
//!      8  ClientTransactionID        u32
//!     12  ServerTransactionID        u32
//!     16  DataStart                  i32
//!     20  ImageElementType           i32
//!     24  TransmissionElementType    i32
//!     28  Rank                       i32
//!     32  Dimension1                 i32
//!     36  Dimension2                 i32
//!     40  Dimension3                 i32
//! ```
//!
//! When ErrorNumber is non-zero the bytes from DataStart to the end of the
//! frame hold a UTF-8 error message instead of array data.

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ParsedResponse;

/// The only metadata version currently defined
pub const SUPPORTED_METADATA_VERSION: i32 = 1;

/// Length in bytes of the version 1 metadata header
pub const METADATA_V1_LENGTH: usize = 44;

/// Version 1 metadata header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayMetadataV1 {
    pub metadata_version: i32,
    pub error_number: i32,
    pub client_transaction_id: u32,
    pub server_transaction_id: u32,
    pub data_start: i32,
    pub image_element_type: i32,
    pub transmission_element_type: i32,
    pub rank: i32,
    pub dimension1: i32,
    pub dimension2: i32,
    pub dimension3: i32,
}

/// A decoded frame: header plus the error message when one was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytesFrame {
    pub metadata: ArrayMetadataV1,
    pub error_message: String,
}

impl ImageBytesFrame {
    /// Decode a frame. Unknown metadata versions are decoded with the
    /// version 1 layout; callers decide how to report the version.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < METADATA_V1_LENGTH {
            return Err(Error::Frame(format!(
                "frame is {} bytes long, the metadata header needs {}",
                frame.len(),
                METADATA_V1_LENGTH
            )));
        }

        let mut buf = &frame[..METADATA_V1_LENGTH];
        let metadata = ArrayMetadataV1 {
            metadata_version: buf.get_i32_le(),
            error_number: buf.get_i32_le(),
            client_transaction_id: buf.get_u32_le(),
            server_transaction_id: buf.get_u32_le(),
            data_start: buf.get_i32_le(),
            image_element_type: buf.get_i32_le(),
            transmission_element_type: buf.get_i32_le(),
            rank: buf.get_i32_le(),
            dimension1: buf.get_i32_le(),
            dimension2: buf.get_i32_le(),
            dimension3: buf.get_i32_le(),
        };

        let error_message = if metadata.error_number != 0 {
            let start = usize::try_from(metadata.data_start)
                .ok()
                .filter(|start| *start <= frame.len())
                .ok_or_else(|| {
                    Error::Frame(format!(
                        "data start {} lies outside the {} byte frame",
                        metadata.data_start,
                        frame.len()
                    ))
                })?;
            String::from_utf8_lossy(&frame[start..]).into_owned()
        } else {
            String::new()
        };

        Ok(Self {
            metadata,
            error_message,
        })
    }

    /// Peek at the metadata version without decoding the rest
    pub fn metadata_version(frame: &[u8]) -> Result<i32> {
        if frame.len() < 4 {
            return Err(Error::Frame("frame is too short to hold a metadata version".into()));
        }
        let mut buf = frame;
        Ok(buf.get_i32_le())
    }

    pub fn is_supported_version(&self) -> bool {
        self.metadata.metadata_version == SUPPORTED_METADATA_VERSION
    }

    /// The logical envelope carried by this frame
    pub fn envelope(&self) -> ParsedResponse {
        ParsedResponse {
            client_transaction_id: self.metadata.client_transaction_id,
            server_transaction_id: self.metadata.server_transaction_id,
            error_number: self.metadata.error_number,
            error_message: self.error_message.clone(),
        }
    }

    /// Short text used in place of the binary body in reports
    pub fn summary(&self) -> String {
        format!(
            "ClientTransactionID: {}, ServerTransactionID: {}, ErrorNumber: {}, ErrorMessage: '{}'",
            self.metadata.client_transaction_id,
            self.metadata.server_transaction_id,
            self.metadata.error_number,
            self.error_message
        )
    }
}
