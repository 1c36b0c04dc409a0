////////////////////////////////////////////////////////////////////////
//
// 1. 每个Domain(Entity)单独一个文件夹
// 2. 每个Domain由以下部分组成:
//    - model: 定义Schema
//    - repository: 实际的数据库底层操作
//    - memory: 同一接口的进程内实现(测试/本地运行)
//
//////////////////////////////////////////////////////////////////////

use mongodb::{Client, Collection};
use referral::model::{ReferralCode, ReferralReward, ReferralUsage};
use std::sync::Arc;
use tracing::{info, warn};
use utils::{AppConfig, AppResult};

pub mod referral;

pub const REFERRAL_CODES: &str = "referralCodes";
pub const REFERRAL_USAGES: &str = "referralUsages";
pub const REFERRAL_REWARDS: &str = "referralRewards";

#[derive(Clone, Debug)]
pub struct Database {
    pub client: Client,
    pub referral_codes: Collection<ReferralCode>,
    pub referral_usages: Collection<ReferralUsage>,
    pub referral_rewards: Collection<ReferralReward>,
}

impl Database {
    pub async fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let db: mongodb::Database = client.database(&config.mongo_db);

        let referral_codes = db.collection(REFERRAL_CODES);
        let referral_usages = db.collection(REFERRAL_USAGES);
        let referral_rewards = db.collection(REFERRAL_REWARDS);

        info!("🧱 database({:#}) connected.", &config.mongo_db);

        Ok(Database {
            client,
            referral_codes,
            referral_usages,
            referral_rewards,
        })
    }

    /// 初始化推荐相关集合索引
    ///
    /// 索引创建失败不会阻止启动，但唯一索引缺失时并发兑换只能依赖应用层检查
    pub async fn init_repository_indexes(&self) -> AppResult<()> {
        if let Err(e) = referral::repository::init_indexes(self).await {
            warn!("⚠️ 推荐索引初始化失败: {}", e);
            return Err(e);
        }

        info!("✅ 推荐索引初始化完成");
        Ok(())
    }
}

pub use referral::{
    memory::MemoryReferralRepository,
    model as referral_model,
    repository::{DynReferralRepository, ReferralRepositoryTrait, RewardSettlement},
};
