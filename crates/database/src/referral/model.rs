use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

pub const DEFAULT_MAX_USAGE: u32 = 50;
pub const DEFAULT_REWARD_AMOUNT: i64 = 10000;
pub const DEFAULT_CODE_TTL_DAYS: i64 = 365;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// 当前unix时间戳(秒)
pub fn now_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// 推荐码规范化：去除首尾空白并转大写，非字母数字或为空时返回None
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code)
}

/// 推荐码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCode {
    /// MongoDB对象ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// 推荐码所属用户
    pub owner_user_id: String,
    pub owner_name: String,
    pub owner_email: String,
    /// 大写字母数字，活跃推荐码之间唯一
    pub code: String,
    /// 已被使用次数
    pub usage_count: u32,
    pub max_usage: u32,
    /// 每次兑换给推荐人的奖励金额
    pub reward_amount: i64,
    pub is_active: bool,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl ReferralCode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_user_id: &str,
        owner_name: &str,
        owner_email: &str,
        code: String,
        max_usage: u32,
        reward_amount: i64,
        ttl_days: i64,
        now: u64,
    ) -> Self {
        let expires_at = (now as i64).saturating_add(ttl_days.saturating_mul(SECONDS_PER_DAY)).max(0) as u64;

        Self {
            id: None,
            owner_user_id: owner_user_id.to_string(),
            owner_name: owner_name.to_string(),
            owner_email: owner_email.to_string(),
            code,
            usage_count: 0,
            max_usage,
            reward_amount,
            is_active: true,
            created_at: now,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_usage
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// 兑换记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Pending,
    Approved,
    Paid,
    /// 声明但没有任何流程会进入该状态
    Expired,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Pending => "pending",
            UsageStatus::Approved => "approved",
            UsageStatus::Paid => "paid",
            UsageStatus::Expired => "expired",
        }
    }
}

impl From<RewardStatus> for UsageStatus {
    fn from(status: RewardStatus) -> Self {
        match status {
            RewardStatus::Pending => UsageStatus::Pending,
            RewardStatus::Approved => UsageStatus::Approved,
            RewardStatus::Paid => UsageStatus::Paid,
        }
    }
}

/// 奖励状态: pending -> approved -> paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Pending,
    Approved,
    Paid,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Pending => "pending",
            RewardStatus::Approved => "approved",
            RewardStatus::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<RewardStatus> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(RewardStatus::Pending),
            "approved" => Some(RewardStatus::Approved),
            "paid" => Some(RewardStatus::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 奖励来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RewardSource {
    Referral,
    Bonus,
    Promotion,
}

/// 推荐码兑换记录，每个兑换用户最多一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralUsage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub referrer_owner_id: String,
    pub referrer_code: String,
    pub redeemed_by_user_id: String,
    pub redeemed_by_name: String,
    pub redeemed_by_email: String,
    /// 兑换时从推荐码复制，之后推荐码金额变化不影响
    pub reward_amount: i64,
    /// 同一批次中创建的奖励
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<ObjectId>,
    pub status: UsageStatus,
    pub used_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<u64>,
}

impl ReferralUsage {
    pub fn pending(code: &ReferralCode, redeemer: &Beneficiary, now: u64) -> Self {
        Self {
            id: None,
            referrer_owner_id: code.owner_user_id.clone(),
            referrer_code: code.code.clone(),
            redeemed_by_user_id: redeemer.user_id.clone(),
            redeemed_by_name: redeemer.name.clone(),
            redeemed_by_email: redeemer.email.clone(),
            reward_amount: code.reward_amount,
            reward_id: None,
            status: UsageStatus::Pending,
            used_at: now,
            paid_at: None,
        }
    }
}

/// 奖励记录，与兑换记录解耦(奖金、促销也会产生奖励)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReward {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub beneficiary_user_id: String,
    pub beneficiary_name: String,
    pub beneficiary_email: String,
    pub amount: i64,
    pub source: RewardSource,
    pub status: RewardStatus,
    pub description: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<String>,
}

impl ReferralReward {
    pub fn pending(beneficiary: &Beneficiary, amount: i64, source: RewardSource, description: String, now: u64) -> Self {
        Self {
            id: None,
            beneficiary_user_id: beneficiary.user_id.clone(),
            beneficiary_name: beneficiary.name.clone(),
            beneficiary_email: beneficiary.email.clone(),
            amount,
            source,
            status: RewardStatus::Pending,
            description,
            created_at: now,
            paid_at: None,
            payment_method: None,
            payment_details: None,
        }
    }

    /// 推荐兑换产生的奖励，受益人为推荐码所有者
    pub fn for_redemption(code: &ReferralCode, redeemer_name: &str, now: u64) -> Self {
        let owner = Beneficiary {
            user_id: code.owner_user_id.clone(),
            name: code.owner_name.clone(),
            email: code.owner_email.clone(),
        };
        Self::pending(
            &owner,
            code.reward_amount,
            RewardSource::Referral,
            format!("{}님 추천 보상", redeemer_name),
            now,
        )
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// 由身份提供方给出的用户信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Beneficiary {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

impl Beneficiary {
    pub fn new(user_id: &str, name: &str, email: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

/// 推荐等级：按已支付的推荐数划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReferralLevel {
    Bronze,
    Silver,
    Gold,
}

impl ReferralLevel {
    pub fn from_successful(successful: u64) -> Self {
        if successful >= 16 {
            ReferralLevel::Gold
        } else if successful >= 6 {
            ReferralLevel::Silver
        } else {
            ReferralLevel::Bronze
        }
    }
}

/// 推荐人统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_usages: u64,
    pub pending_usages: u64,
    pub approved_usages: u64,
    pub paid_usages: u64,
    pub expired_usages: u64,
    /// 待审批的奖励金额
    pub awaiting_approval_amount: i64,
    /// approved + paid
    pub earned_amount: i64,
    /// 实际已发放
    pub paid_amount: i64,
    /// earned - paid
    pub pending_amount: i64,
    pub level: ReferralLevel,
}

impl ReferralStats {
    pub fn from_usages(usages: &[ReferralUsage]) -> Self {
        let mut stats = ReferralStats {
            total_usages: 0,
            pending_usages: 0,
            approved_usages: 0,
            paid_usages: 0,
            expired_usages: 0,
            awaiting_approval_amount: 0,
            earned_amount: 0,
            paid_amount: 0,
            pending_amount: 0,
            level: ReferralLevel::Bronze,
        };

        for usage in usages {
            stats.total_usages += 1;
            match usage.status {
                UsageStatus::Pending => {
                    stats.pending_usages += 1;
                    stats.awaiting_approval_amount += usage.reward_amount;
                }
                UsageStatus::Approved => {
                    stats.approved_usages += 1;
                    stats.earned_amount += usage.reward_amount;
                }
                UsageStatus::Paid => {
                    stats.paid_usages += 1;
                    stats.earned_amount += usage.reward_amount;
                    stats.paid_amount += usage.reward_amount;
                }
                UsageStatus::Expired => stats.expired_usages += 1,
            }
        }

        stats.pending_amount = stats.earned_amount - stats.paid_amount;
        stats.level = ReferralLevel::from_successful(stats.paid_usages);
        stats
    }
}
