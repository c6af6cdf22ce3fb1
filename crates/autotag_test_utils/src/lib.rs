//! Autotag Test Utilities
//!
//! - [`FakeRepository`]: in-memory folder tree implementing `Repository`,
//!   with call recording and failure injection
//! - [`ZipFixture`]: builder for archives, including hostile entry names
//! - [`manifest`]: package manifest bodies
//! - [`FakeBroker`]: scripted STOMP peer on an in-memory duplex pipe
//!
//! # Usage
//!
//! ```rust,ignore
//! use autotag_test_utils::{FakeRepository, ZipFixture, manifest};
//!
//! let repo = FakeRepository::new();
//! let parent = repo.mkdirs("Courses/RealEstate");
//! let zip = ZipFixture::new()
//!     .file("imsmanifest.xml", manifest::VALID)
//!     .file("index.html", "<html/>")
//!     .to_bytes();
//! repo.add_node("zip-1", &parent, "course.zip", zip);
//! ```

pub mod fake_broker;
pub mod fake_repository;
pub mod zip_fixture;

pub use fake_broker::{broker_pair, FakeBroker};
pub use fake_repository::{FakeRepository, Op};
pub use zip_fixture::{manifest, ZipFixture};
