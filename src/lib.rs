pub mod config;
pub mod error;
pub mod files;
pub mod query;
pub mod transfer;
pub mod utils;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use drivers::google_drive::{Credentials, DriveClient, FileLookup, FileUpdate, ListQuery, UploadOptions};
pub use error::{DriveError, Result};
pub use files::{mimetypes, File};
pub use query::{build_query, build_query_with, Clause, Operator, QueryValue};
pub use transfer::{
    run_resumable_transfer, ChunkOutcome, ChunkedTransfer, ConsoleProgress, NoProgress, ProgressSink,
    RetryPolicy, TransferProgress,
};
