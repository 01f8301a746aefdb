#[tokio::main]
async fn main() -> anyhow::Result<()> {
    elasticferry::run().await
}
