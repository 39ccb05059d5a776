// src/lib.rs
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod rooms;
pub mod services;
pub mod store;
