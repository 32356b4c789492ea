/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
//#![warn(missing_docs, rust_2018_idioms)]
pub mod crypto;
pub mod crypto_impl;

mod bridge;
mod log_event;

pub mod application;
pub mod handle_table;
pub mod key_uri;
pub mod registry;
pub mod result;

#[cfg(feature = "default-crypto")]
pub mod ffi;

pub use crate::bridge::*;
pub use crate::log_event::*;
