// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed binary serialization.
//!
//! A request is built by encoding values into an [`OutputBuffer`] in order;
//! the receiver decodes them out of an [`InputBuffer`] in the same order.
//! Decoding advances the read cursor but never touches the bytes.

mod buffer;
mod wire;

pub use buffer::{InputBuffer, OutputBuffer};
pub use wire::{Decode, DecodeOwned, Encode};
