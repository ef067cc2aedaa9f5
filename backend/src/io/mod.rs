//! # IO Module
//!
//! Adapter between HTTP clients and the domain layer. Handlers translate
//! JSON requests into service calls and domain errors into status codes
//! plus a [`shared::Notification`]; no business rule lives here.

pub mod rest;

pub use rest::*;
