//! Common types shared by the definition registry, the adaptors and the
//! retriever service.

pub mod error;
pub mod request;
pub mod time;

pub use error::{RequestError, RequestResult};
pub use request::{Request, FORMAT_KEYS, DOWNLOAD_FORMAT_KEY, POST_PROCESS_KEY};
pub use time::{count_dates, expand_dates, parse_date, MAX_EXPANDED_DATES};
