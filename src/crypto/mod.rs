//! Signed-token verification.

pub mod jwt;
