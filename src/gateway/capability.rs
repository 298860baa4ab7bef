//! Capability markers.
//!
//! Every query function that trusts a caller-asserted identity takes an
//! [`Authorized`] as its first parameter, and every pre-authentication query
//! takes a [`PreAuth`]. Neither type can be built outside `crate::gateway`,
//! so code that skips the gateway cannot produce the first argument.

/// Proof that the bearer token for this call was verified and its last-use
/// time recorded.
#[derive(Debug)]
pub struct Authorized {
    _sealed: (),
}

impl Authorized {
    pub(super) const fn new() -> Self {
        Self { _sealed: () }
    }
}

/// Proof that this call was dispatched through the gateway's unauthenticated
/// entry point. Only the functions in [`super::preauth`] accept it.
#[derive(Debug)]
pub struct PreAuth {
    _sealed: (),
}

impl PreAuth {
    pub(super) const fn new() -> Self {
        Self { _sealed: () }
    }
}
