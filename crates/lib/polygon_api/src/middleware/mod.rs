//! Request middleware.

pub mod gateway;
