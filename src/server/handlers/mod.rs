//! HTTP and WebSocket request handlers.

pub mod auth;
pub mod chat;
pub mod friends;
pub mod health;
pub mod notifications;
pub mod users;
pub mod websocket;
