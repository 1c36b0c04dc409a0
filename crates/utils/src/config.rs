use clap::Parser;
use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum CargoEnv {
    Development,
    Production,
}

/// 环境配置加载器
pub struct EnvLoader;

impl EnvLoader {
    /// 根据 CARGO_ENV 加载对应的环境配置文件
    pub fn load_env_file() -> Result<(), Box<dyn std::error::Error>> {
        let cargo_env = std::env::var("CARGO_ENV").unwrap_or_else(|_| "development".to_string());
        let env_file = Self::env_file_for(&cargo_env);

        if !std::path::Path::new(env_file).exists() {
            eprintln!("⚠️  配置文件 {} 不存在，尝试加载默认的 .env 文件", env_file);
            if std::path::Path::new(".env").exists() {
                dotenvy::from_filename(".env")?;
                println!("✅ 已加载默认配置文件: .env");
            } else {
                eprintln!("❌ 未找到任何配置文件，使用默认配置");
            }
            return Ok(());
        }

        dotenvy::from_filename(env_file)?;
        println!("✅ 已加载环境配置文件: {} (CARGO_ENV={})", env_file, cargo_env);

        Ok(())
    }

    /// CARGO_ENV 到配置文件名的映射，未知值回退到开发环境
    pub fn env_file_for(cargo_env: &str) -> &'static str {
        match cargo_env {
            "production" | "Production" | "prod" => ".env.production",
            "development" | "Development" | "dev" => ".env.development",
            "test" | "Test" => ".env.test",
            _ => {
                println!("⚠️  未知的 CARGO_ENV: {}，使用默认的 .env.development", cargo_env);
                ".env.development"
            }
        }
    }
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    #[clap(long, env, default_value = "0.0.0.0")]
    pub app_host: String,

    #[clap(long, env, default_value = "8000")]
    pub app_port: u16,

    #[clap(long, env, default_value = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    #[clap(long, env)]
    pub mongo_db: String,

    #[clap(long, env, default_value = "info")]
    pub rust_log: String,

    /// 生产环境日志目录，缺省时由Logger自行推断
    #[clap(long, env)]
    pub log_dir: Option<PathBuf>,

    /// 每个推荐码允许被使用的最大次数
    #[clap(long, env, default_value = "50", value_parser = clap::value_parser!(u32).range(1..))]
    pub referral_max_usage: u32,

    /// 每次推荐成功给推荐人的奖励金额
    #[clap(long, env, default_value = "10000")]
    pub referral_reward_amount: i64,

    /// 推荐码有效天数
    #[clap(long, env, default_value = "365")]
    pub referral_code_ttl_days: i64,

    /// 预订佣金：一级推荐人比例
    #[clap(long, env, default_value = "0.05")]
    pub commission_first_tier_pct: f64,

    /// 预订佣金：二级推荐人比例
    #[clap(long, env, default_value = "0.02")]
    pub commission_second_tier_pct: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        EnvLoader::load_env_file().ok();
        AppConfig::parse()
    }
}

impl AppConfig {
    /// 手动创建配置实例（用于测试）
    pub fn new_for_test() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            app_host: "0.0.0.0".to_string(),
            app_port: 8765,
            mongo_uri: std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db: std::env::var("MONGO_DB").unwrap_or_else(|_| "test_db".to_string()),
            rust_log: "info".to_string(),
            log_dir: None,
            referral_max_usage: 50,
            referral_reward_amount: 10000,
            referral_code_ttl_days: 365,
            commission_first_tier_pct: 0.05,
            commission_second_tier_pct: 0.02,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_file_mapping() {
        assert_eq!(EnvLoader::env_file_for("production"), ".env.production");
        assert_eq!(EnvLoader::env_file_for("prod"), ".env.production");
        assert_eq!(EnvLoader::env_file_for("dev"), ".env.development");
        assert_eq!(EnvLoader::env_file_for("Test"), ".env.test");
        assert_eq!(EnvLoader::env_file_for("staging"), ".env.development");
    }

    #[test]
    fn test_parse_defaults() {
        let config = AppConfig::parse_from(["referral-ledger", "--cargo-env", "development", "--mongo-db", "ledger"]);

        assert_eq!(config.cargo_env, CargoEnv::Development);
        assert_eq!(config.app_port, 8000);
        assert_eq!(config.referral_max_usage, 50);
        assert_eq!(config.referral_reward_amount, 10000);
        assert_eq!(config.referral_code_ttl_days, 365);
        assert!((config.commission_first_tier_pct - 0.05).abs() < f64::EPSILON);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_max_usage_must_be_positive() {
        let base = ["referral-ledger", "--cargo-env", "development", "--mongo-db", "ledger"];

        let zero = AppConfig::try_parse_from(base.iter().copied().chain(["--referral-max-usage", "0"]));
        assert!(zero.is_err());

        let one = AppConfig::try_parse_from(base.iter().copied().chain(["--referral-max-usage", "1"])).unwrap();
        assert_eq!(one.referral_max_usage, 1);
    }
}
