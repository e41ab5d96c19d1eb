//! Cleanup rules run on extracted programs.

pub mod boxing;

pub use boxing::{boxing_cleanup, fold_boxing_round_trip, fold_nop_boxing};
