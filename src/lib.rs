//! Parley Messaging Backend Library
//!
//! Core components of the private-messaging subsystem: the durable
//! conversation/message store, the live connection registry, the
//! WebSocket relay, and the pull-based history API.

pub mod api;
pub mod auth;
pub mod chat;
pub mod db;
pub mod user;
pub mod ws;
