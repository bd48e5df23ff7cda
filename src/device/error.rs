//! Error types for the virtual devices

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// uinput refused to create the device (missing permissions, no module)
    #[error("Failed to create virtual {device} device: {source}")]
    Creation {
        device: &'static str,
        #[source]
        source: io::Error,
    },
}
