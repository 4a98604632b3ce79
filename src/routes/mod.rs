//! HTTP route handlers that sit outside the auth module.

pub mod health;
