use clap::Parser;

use edupage_services::env::{setup_tracing, Env};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Env::parse();
    setup_tracing(env.log_level);
    edupage_services::launch(env).await
}
