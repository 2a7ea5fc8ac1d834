pub mod client;
pub mod multipart;

pub use client::PinClient;
pub use multipart::{FileEncoder, MultipartEncoder, DEFAULT_CHUNK_SIZE, FILES_FIELD, FILE_CONTENT_TYPE};
