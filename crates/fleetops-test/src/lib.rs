//! # fleetops-test
//!
//! Fixture builders shared across the workspace's test suites: minimal
//! valid `Release`/`Service` documents and `Instances` health maps, built
//! fluently and overridden only where a test cares.
//!
//! ```rust
//! use fleetops_test::ReleaseFixture;
//!
//! let release = ReleaseFixture::new("proj", "conf").build();
//! assert_eq!(release.project_name, "proj");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fixtures;

pub use error::{Result, TestError};
pub use fixtures::{instances_fixture, release_from_json_file, ReleaseFixture, ServiceFixture};
