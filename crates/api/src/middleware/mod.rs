//! Request extractors.
//!
//! - [`identity::CallerIdentity`] -- the already-authenticated caller,
//!   taken from the upstream auth layer's forwarded header.

pub mod identity;
