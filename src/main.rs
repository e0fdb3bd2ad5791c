#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    ticket_proof::run().await
}
