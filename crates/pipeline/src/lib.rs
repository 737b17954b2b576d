//! The manual test-report submission pipeline.
//!
//! Sequencing lives in [`submission::SubmissionPipeline`]: resolve theme,
//! take in the attachment, run the record writer, then forward the record
//! to the reporter unless the submission is a dry run. Every stage failure
//! is folded into the transcript and final status; nothing here aborts the
//! host process.

pub mod forwarder;
pub mod submission;
pub mod transcript;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
