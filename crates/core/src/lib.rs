//! Domain logic for the manual test-report gateway.
//!
//! Everything here is free of HTTP concerns: theme resolution, record
//! construction, record-file naming, attachment intake, and the
//! command-execution boundary used to drive the external writer and
//! reporter programs.

pub mod attachment;
pub mod config;
pub mod error;
pub mod naming;
pub mod record;
pub mod scripting;
pub mod theme;
