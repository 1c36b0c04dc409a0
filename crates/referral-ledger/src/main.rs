use anyhow::{Context, Result};
use clap::Parser;
use server::app::ApplicationServer;
use std::sync::Arc;
use tracing::info;
use utils::{AppConfig, Logger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = with_config();

    // guard 必须活到进程结束，否则非阻塞写入的日志会丢失
    let _guard = Logger::new_with_log_dir(config.cargo_env, config.log_dir.clone());

    info!(
        "🔔 referral-ledger starting (env={:?}, db={})",
        config.cargo_env, config.mongo_db
    );

    ApplicationServer::serve(config)
        .await
        .context("🔴 Failed to start server")?;

    info!("👋 referral-ledger stopped");
    Ok(())
}

fn with_config() -> Arc<AppConfig> {
    // 根据 CARGO_ENV 加载对应的环境配置文件
    if let Err(e) = utils::EnvLoader::load_env_file() {
        eprintln!("⚠️  加载环境配置文件失败: {}", e);
    }

    Arc::new(AppConfig::parse())
}
