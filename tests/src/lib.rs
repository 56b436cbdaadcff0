//! # Controller Messenger Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── messenger_benchmarks.rs   # publish fan-out, action calls, composition
//! └── src/
//!     └── integration/              # Cross-crate flows
//!         ├── flows.rs              # controllers talking through restricted views
//!         └── composition.rs        # composable controller over mixed children
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p controller-tests
//!
//! # By category
//! cargo test -p controller-tests integration::flows
//! cargo test -p controller-tests integration::composition
//!
//! # Benchmarks
//! cargo bench -p controller-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]
