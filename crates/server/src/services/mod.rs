////////////////////////////////////////////////////////////////////////
//
// 1. 每个业务单独一个文件夹
// 2. 业务层只依赖 database 中的 Repository trait，
//    生产环境注入 Database，测试注入 MemoryReferralRepository
//
//////////////////////////////////////////////////////////////////////

pub mod referral;

use database::{Database, DynReferralRepository};
use referral::{DynReferralLedger, ReferralLedger, ReferralPolicy};
use std::sync::Arc;
use tracing::info;
use utils::AppConfig;

#[derive(Clone)]
pub struct Services {
    pub referral: DynReferralLedger,
}

impl Services {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        let repository: DynReferralRepository = Arc::new(db);
        let services = Self::from_repository(repository, ReferralPolicy::from(config));

        info!("🧠 Services initialized");
        services
    }

    pub fn from_repository(repository: DynReferralRepository, policy: ReferralPolicy) -> Self {
        let referral = Arc::new(ReferralLedger::new(repository, policy)) as DynReferralLedger;

        Self { referral }
    }
}
