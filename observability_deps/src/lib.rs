//! This crate exists to coordinate versions of `tracing` used by the rest of
//! the workspace.
//!
//! Until cargo's [-Z direct-minimal-versions] stabilizes and everyone agrees
//! on a tracing version, having a single re-export point keeps the workspace
//! honest: library crates log through this shim and never name `tracing`
//! directly, so an upgrade is a one-line change here.
//!
//! [-Z direct-minimal-versions]: https://doc.rust-lang.org/nightly/cargo/reference/unstable.html#direct-minimal-versions

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub use tracing;
