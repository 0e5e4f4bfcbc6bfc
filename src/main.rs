use clipfetch_lib::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clipfetch_lib::init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    clipfetch_lib::run(config).await
}
