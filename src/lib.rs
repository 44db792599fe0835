pub mod client;
pub mod config;
pub mod humanize;
pub mod locale;
pub mod observability;
pub mod poller;
pub mod preferences;
pub mod scan;

pub use client::{ApiClient, ApiError, Params, RequestOptions};
pub use poller::{JobListener, JobOutcome, JobProgress, JobStatus, PollHandle, ScanPoller};
