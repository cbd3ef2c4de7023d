//! Calendar helpers for month/week layout.
//!
//! # Responsibility
//! - Derive Monday-aligned weeks overlapping one calendar month.
//! - Convert between `(year, month)` pairs and month display keys.
//!
//! # Invariants
//! - Functions here are pure; they never read the clock or storage.

pub mod weeks;
