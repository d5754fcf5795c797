use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = fwat::args::parse();
    fwat::cli::main(args).await
}
