#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hlpr::logging::init();
    hlpr::run().await
}
