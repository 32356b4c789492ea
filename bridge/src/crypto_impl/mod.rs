/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
#[cfg(feature = "p256")]
mod p256_impl;
#[cfg(feature = "p256")]
pub use p256;
#[cfg(feature = "p256")]
pub use p256_impl::*;

#[cfg(all(feature = "p256", feature = "sha2"))]
mod software_enclave;
#[cfg(all(feature = "p256", feature = "sha2"))]
pub use hmac;
#[cfg(all(feature = "p256", feature = "sha2"))]
pub use sha2;
#[cfg(all(feature = "p256", feature = "sha2"))]
pub use software_enclave::*;

#[cfg(feature = "p256")]
mod unavailable;
#[cfg(feature = "p256")]
pub use unavailable::*;
