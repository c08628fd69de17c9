//! HTTP server binary for the tandem backend.
//!
//! All of the logic lives in `tandem::server`; this just parses the CLI
//! and hands control to the async runtime.

#[tokio::main]
async fn main() {
    tandem::server::run().await;
}
