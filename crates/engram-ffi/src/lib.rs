//! Engram FFI – Python (PyO3) and C bindings
//!
//! All C-API entry points wrap Rust calls in `std::panic::catch_unwind`
//! to prevent panics from crashing host processes (Python interpreters,
//! C++ retrieval services).

pub mod c_api;

#[cfg(feature = "python")]
pub mod python;
