//! Top-level facade crate for reqmeter.
//!
//! Re-exports the timing core and the axum integration so users can depend on a single crate.

pub mod core {
    pub use reqmeter_core::*;
}

pub mod http {
    pub use reqmeter_http::*;
}
