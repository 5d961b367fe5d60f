use anyhow::Context;
use fib_cache::app::FibApp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FibApp::run().await.context("fib-cache terminated")
}
