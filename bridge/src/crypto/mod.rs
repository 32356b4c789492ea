mod enclave;
mod p256;

pub use self::enclave::*;
pub use self::p256::*;

// We re-export our dependencies so it is less of a headache for the implementor to use the same
// exact version of them.
pub use rand_core;
