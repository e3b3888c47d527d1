//! Tradewire realtime messaging server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod presence;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod store;
pub mod typing;
pub mod ws;
