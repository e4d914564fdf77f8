use qxp_bank::config::AppConfig;
use qxp_bank::logging::init_logging;
use qxp_bank::{Bank, gateway};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::args().nth(1).unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env);

    let _guard = init_logging(&config);
    info!(
        env = %env,
        git = env!("GIT_HASH"),
        data_dir = %config.storage.data_dir,
        "qxp_bank starting"
    );

    let bank = Bank::open(&config)?;
    info!(accounts = bank.store().len(), transfers = bank.log().len(), "bank open");

    gateway::serve(bank, &config).await
}
