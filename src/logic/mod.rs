//! Pure logic: no I/O, no side effects.
//!
//! # Modules
//!
//! - `resolver`: Module execution order (Kahn's algorithm)
//! - `progress`: Rounded, monotonic progress fractions

pub mod progress;
pub mod resolver;
