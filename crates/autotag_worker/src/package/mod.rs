//! Content-package ingestion.
//!
//! A changed `.zip` binary is downloaded, checked for a package manifest,
//! extracted into a scratch directory and mirrored into a new repository
//! folder next to the archive.

pub mod detect;
pub mod extract;
pub mod processor;
pub mod upload;

pub use detect::{detect_package, PackageDetection};
pub use extract::safe_extract;
pub use processor::{archive_name, process_package};
pub use upload::{upload_tree, UploadSummary};
