//! Bunker: a pinning-service façade for a content-addressed storage daemon.
//!
//! The client side streams a file through a multipart encoder with live
//! progress accounting and stall detection; the server side is a stateless
//! HTTP proxy that normalizes the daemon's pin RPCs.

pub mod cli;
pub mod config;
pub mod core;
pub mod progress;
pub mod proxy;
pub mod uploaders;
pub mod utils;

pub use self::core::{
    AddedFile,
    ErrorCategory,
    ErrorReport,
    PinRecord,
    PinService,
    ProgressSink,
    ProgressUpdate,
    Result,
    TransferError,
    UploadId,
    UploadTask,
};

pub use config::{ClientConfig, ProxyConfig, Settings};
pub use uploaders::{MultipartEncoder, PinClient};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
