#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatehouse_cli::cli::app::run().await
}
