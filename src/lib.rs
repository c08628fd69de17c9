pub mod auth;
pub mod avatar;
pub mod logging;
pub mod server;
pub mod storage;
pub mod stream_chat;
