//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  AlgebraEngine (port)        │
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │  GaloisAlgebra (GF(256))     │
//! └──────────────────────────────┘
//! ```

mod galois;

pub use galois::GaloisAlgebra;
