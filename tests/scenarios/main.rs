//! End-to-end scenarios through the `stratalock` facade.
//!
//! ```bash
//! cargo test --test scenarios
//! ```

#[path = "../common/mod.rs"]
mod common;

mod config_dir;
mod transport_lines;
