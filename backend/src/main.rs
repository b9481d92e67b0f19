#[tokio::main]
async fn main() -> anyhow::Result<()> {
    polsim::start_server().await
}
