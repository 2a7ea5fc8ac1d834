mod errors;
mod traits;
mod types;

pub use errors::{
    extract_detail,
    ErrorCategory,
    ErrorReport,
    FileReadError,
    Result,
    TransferError,
};
pub use traits::{NoProgress, PinService, ProgressSink};
pub use types::{
    AddResponse,
    AddedFile,
    ErrorBody,
    MessageResponse,
    PinRecord,
    PinsResponse,
    ProgressUpdate,
    UnpinRequest,
    UploadId,
    UploadTask,
};
