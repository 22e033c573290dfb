//! markshelf: a personal bookmark shelf with folders, drag-and-drop
//! ordering and optimistic sync against a remote store.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
pub mod database;
pub mod gateway;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
