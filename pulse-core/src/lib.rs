//! Pulse Core
//!
//! This crate provides the fine-grained reactive engine that underlies the
//! Pulse UI framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Write batching with a single coherent propagation pass
//! - Ownership-scoped disposal of arbitrarily deep reactive graphs
//!
//! Higher layers (rendering, stores, routing) are expressed entirely in
//! terms of these primitives; they consume this crate through the handful
//! of functions re-exported from [`reactive`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_core::reactive::{computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = computed(move || count.get() * 2);
//!
//! // Create an effect
//! effect(move || {
//!     println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod reactive;
