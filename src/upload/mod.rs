pub mod client;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use client::{validate_destination, HttpUploadClient, ImageUploader, ServerConfig};
pub use scheduler::{Completion, PendingUpload, SchedulerState, UploadOutcome, UploadScheduler};
