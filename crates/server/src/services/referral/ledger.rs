use super::{
    error::{ReferralError, ReferralResult},
    generator::{CodeGenerator, DefaultCodeGenerator},
};
use async_trait::async_trait;
use chrono::Utc;
use database::{
    referral_model::{
        normalize_code, now_timestamp, Beneficiary, ReferralCode, ReferralReward, ReferralStats, ReferralUsage,
        RewardSource, RewardStatus, DEFAULT_CODE_TTL_DAYS, DEFAULT_MAX_USAGE, DEFAULT_REWARD_AMOUNT,
    },
    DynReferralRepository, RewardSettlement,
};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utils::{AppConfig, AppError};

/// 生成唯一推荐码的最大尝试次数
pub const MAX_CODE_GENERATION_ATTEMPTS: u32 = 10;

const FIRST_TIER_DESCRIPTION: &str = "1차 추천 보상";
const SECOND_TIER_DESCRIPTION: &str = "2차 추천 보상";

/// 推荐码默认参数及预订佣金比例
#[derive(Debug, Clone, PartialEq)]
pub struct ReferralPolicy {
    pub max_usage: u32,
    pub reward_amount: i64,
    pub code_ttl_days: i64,
    pub first_tier_pct: f64,
    pub second_tier_pct: f64,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            max_usage: DEFAULT_MAX_USAGE,
            reward_amount: DEFAULT_REWARD_AMOUNT,
            code_ttl_days: DEFAULT_CODE_TTL_DAYS,
            first_tier_pct: 0.05,
            second_tier_pct: 0.02,
        }
    }
}

impl From<&AppConfig> for ReferralPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_usage: config.referral_max_usage,
            reward_amount: config.referral_reward_amount,
            code_ttl_days: config.referral_code_ttl_days,
            first_tier_pct: config.commission_first_tier_pct,
            second_tier_pct: config.commission_second_tier_pct,
        }
    }
}

pub type DynReferralLedger = Arc<dyn ReferralLedgerTrait + Send + Sync>;

#[async_trait]
pub trait ReferralLedgerTrait {
    /// 返回用户当前的活跃推荐码，没有时生成一个
    async fn issue_or_get_code(
        &self,
        owner_user_id: &str,
        owner_name: &str,
        owner_email: &str,
    ) -> ReferralResult<ReferralCode>;

    /// 大小写不敏感，未激活或已过期的推荐码视为不存在
    async fn lookup_by_code(&self, code: &str) -> ReferralResult<Option<ReferralCode>>;

    async fn redeem(
        &self,
        code: &str,
        redeemer_user_id: &str,
        redeemer_name: &str,
        redeemer_email: &str,
    ) -> ReferralResult<ReferralUsage>;

    /// 兑换结果未知时，调用方在重试前先查询
    async fn redemption_for(&self, redeemer_user_id: &str) -> ReferralResult<Option<ReferralUsage>>;

    async fn approve_reward(&self, reward_id: &str) -> ReferralResult<ReferralReward>;

    async fn pay_reward(
        &self,
        reward_id: &str,
        payment_method: &str,
        payment_details: Option<String>,
    ) -> ReferralResult<ReferralReward>;

    async fn deactivate(&self, code_id: &str) -> ReferralResult<ReferralCode>;

    async fn reactivate(&self, code_id: &str) -> ReferralResult<ReferralCode>;

    async fn stats(&self, owner_user_id: &str) -> ReferralResult<ReferralStats>;

    async fn list_usages(&self, owner_user_id: &str) -> ReferralResult<Vec<ReferralUsage>>;

    async fn list_rewards(&self, beneficiary_user_id: &str) -> ReferralResult<Vec<ReferralReward>>;

    async fn list_rewards_by_status(&self, status: RewardStatus) -> ReferralResult<Vec<ReferralReward>>;

    /// 奖金/促销等非兑换来源的奖励
    async fn grant_reward(
        &self,
        beneficiary: Beneficiary,
        amount: i64,
        source: RewardSource,
        description: String,
    ) -> ReferralResult<ReferralReward>;

    /// 预订佣金：一级、二级推荐人各得一笔pending奖励
    async fn record_booking_commission(
        &self,
        booking_user_id: &str,
        booking_amount: i64,
    ) -> ReferralResult<Vec<ReferralReward>>;
}

#[derive(Clone)]
pub struct ReferralLedger {
    repository: DynReferralRepository,
    generator: Arc<dyn CodeGenerator>,
    policy: ReferralPolicy,
}

impl ReferralLedger {
    pub fn new(repository: DynReferralRepository, policy: ReferralPolicy) -> Self {
        Self {
            repository,
            generator: Arc::new(DefaultCodeGenerator),
            policy,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    async fn advance(
        &self,
        reward_id: &str,
        from: RewardStatus,
        to: RewardStatus,
        settlement: Option<RewardSettlement>,
    ) -> ReferralResult<ReferralReward> {
        let id = parse_id(reward_id).ok_or_else(|| ReferralError::RewardNotFound(reward_id.to_string()))?;

        let current = self
            .repository
            .find_reward_by_id(&id)
            .await?
            .ok_or_else(|| ReferralError::RewardNotFound(reward_id.to_string()))?;

        if current.status != from {
            return Err(ReferralError::InvalidRewardState {
                expected: from,
                actual: current.status,
            });
        }

        if let Some(updated) = self.repository.advance_reward(&id, from, to, settlement).await? {
            info!("✅ 奖励状态更新: reward={}, {} -> {}", reward_id, from, to);
            return Ok(updated);
        }

        // 读取与条件更新之间状态已被其他请求改变
        let actual = self
            .repository
            .find_reward_by_id(&id)
            .await?
            .map(|r| r.status)
            .ok_or_else(|| ReferralError::RewardNotFound(reward_id.to_string()))?;
        warn!("⚠️ 奖励状态并发变更: reward={}, expected={}, actual={}", reward_id, from, actual);

        Err(ReferralError::InvalidRewardState { expected: from, actual })
    }

    /// 通过推荐码文档找到用户的展示信息(包括已停用的推荐码)
    async fn beneficiary_of(&self, user_id: &str) -> ReferralResult<Beneficiary> {
        let beneficiary = match self.repository.find_latest_code_by_owner(user_id).await? {
            Some(code) => Beneficiary::new(&code.owner_user_id, &code.owner_name, &code.owner_email),
            None => Beneficiary::new(user_id, "", ""),
        };

        Ok(beneficiary)
    }
}

fn parse_id(raw: &str) -> Option<ObjectId> {
    ObjectId::parse_str(raw.trim()).ok()
}

fn commission(amount: i64, pct: f64) -> i64 {
    (amount as f64 * pct).floor() as i64
}

#[async_trait]
impl ReferralLedgerTrait for ReferralLedger {
    async fn issue_or_get_code(
        &self,
        owner_user_id: &str,
        owner_name: &str,
        owner_email: &str,
    ) -> ReferralResult<ReferralCode> {
        if let Some(existing) = self.repository.find_active_code_by_owner(owner_user_id).await? {
            debug!("用户 {} 已有推荐码 {}", owner_user_id, existing.code);
            return Ok(existing);
        }

        for attempt in 1..=MAX_CODE_GENERATION_ATTEMPTS {
            let raw = self.generator.generate(owner_name, Utc::now());
            let Some(candidate) = normalize_code(&raw) else {
                warn!("⚠️ 生成的推荐码格式不合法: {:?} (attempt {})", raw, attempt);
                continue;
            };

            if self.repository.active_code_exists(&candidate).await? {
                debug!("推荐码冲突: {} (attempt {})", candidate, attempt);
                continue;
            }

            let code = ReferralCode::new(
                owner_user_id,
                owner_name,
                owner_email,
                candidate,
                self.policy.max_usage,
                self.policy.reward_amount,
                self.policy.code_ttl_days,
                now_timestamp(),
            );

            match self.repository.insert_code(code).await {
                Ok(created) => {
                    info!("✅ 推荐码已创建: owner={}, code={}", owner_user_id, created.code);
                    return Ok(created);
                }
                Err(AppError::Conflict(reason)) => {
                    // 同一用户的并发请求可能已经创建成功
                    if let Some(existing) = self.repository.find_active_code_by_owner(owner_user_id).await? {
                        return Ok(existing);
                    }
                    debug!("推荐码写入冲突: {} (attempt {})", reason, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("❌ 推荐码生成次数耗尽: owner={}", owner_user_id);
        Err(ReferralError::CodeGenerationExhausted(MAX_CODE_GENERATION_ATTEMPTS))
    }

    async fn lookup_by_code(&self, code: &str) -> ReferralResult<Option<ReferralCode>> {
        let Some(normalized) = normalize_code(code) else {
            return Ok(None);
        };

        let found = self.repository.find_active_code_by_code(&normalized).await?;

        Ok(found.filter(|c| !c.is_expired_at(now_timestamp())))
    }

    async fn redeem(
        &self,
        code: &str,
        redeemer_user_id: &str,
        redeemer_name: &str,
        redeemer_email: &str,
    ) -> ReferralResult<ReferralUsage> {
        let normalized = normalize_code(code).ok_or(ReferralError::InvalidCode)?;

        let referral_code = self
            .repository
            .find_active_code_by_code(&normalized)
            .await?
            .ok_or(ReferralError::InvalidCode)?;

        if referral_code.owner_user_id == redeemer_user_id {
            return Err(ReferralError::SelfReferralForbidden);
        }

        if self.repository.find_usage_by_redeemer(redeemer_user_id).await?.is_some() {
            return Err(ReferralError::AlreadyRedeemed);
        }

        if referral_code.is_exhausted() {
            return Err(ReferralError::UsageLimitExceeded);
        }

        let now = now_timestamp();
        if referral_code.is_expired_at(now) {
            return Err(ReferralError::CodeExpired);
        }

        let code_id = referral_code
            .id
            .ok_or_else(|| ReferralError::StoreUnavailable(format!("code {} has no id", referral_code.code)))?;

        let redeemer = Beneficiary::new(redeemer_user_id, redeemer_name, redeemer_email);
        let usage = ReferralUsage::pending(&referral_code, &redeemer, now);
        let reward = ReferralReward::for_redemption(&referral_code, redeemer_name, now);

        match self.repository.record_redemption(&code_id, usage, reward).await {
            Ok((usage, reward)) => {
                info!(
                    "✅ 推荐码兑换成功: code={}, referrer={}, redeemer={}, reward={}",
                    usage.referrer_code,
                    usage.referrer_owner_id,
                    redeemer_user_id,
                    reward.id_hex()
                );
                Ok(usage)
            }
            // 唯一索引：并发兑换中另一请求先写入
            Err(AppError::Conflict(_)) => Err(ReferralError::AlreadyRedeemed),
            // 读取之后推荐码被停用
            Err(AppError::NotFound(_)) => Err(ReferralError::InvalidCode),
            Err(e) => {
                warn!("❌ 推荐码兑换写入失败: code={}, redeemer={}, {}", normalized, redeemer_user_id, e);
                Err(e.into())
            }
        }
    }

    async fn redemption_for(&self, redeemer_user_id: &str) -> ReferralResult<Option<ReferralUsage>> {
        Ok(self.repository.find_usage_by_redeemer(redeemer_user_id).await?)
    }

    async fn approve_reward(&self, reward_id: &str) -> ReferralResult<ReferralReward> {
        self.advance(reward_id, RewardStatus::Pending, RewardStatus::Approved, None)
            .await
    }

    async fn pay_reward(
        &self,
        reward_id: &str,
        payment_method: &str,
        payment_details: Option<String>,
    ) -> ReferralResult<ReferralReward> {
        let settlement = RewardSettlement {
            paid_at: now_timestamp(),
            payment_method: payment_method.trim().to_string(),
            payment_details,
        };

        self.advance(reward_id, RewardStatus::Approved, RewardStatus::Paid, Some(settlement))
            .await
    }

    async fn deactivate(&self, code_id: &str) -> ReferralResult<ReferralCode> {
        let id = parse_id(code_id).ok_or_else(|| ReferralError::CodeNotFound(code_id.to_string()))?;

        let code = self
            .repository
            .set_code_active(&id, false)
            .await?
            .ok_or_else(|| ReferralError::CodeNotFound(code_id.to_string()))?;

        info!("🔒 推荐码已停用: code={}, owner={}", code.code, code.owner_user_id);
        Ok(code)
    }

    async fn reactivate(&self, code_id: &str) -> ReferralResult<ReferralCode> {
        let id = parse_id(code_id).ok_or_else(|| ReferralError::CodeNotFound(code_id.to_string()))?;

        let code = self
            .repository
            .find_code_by_id(&id)
            .await?
            .ok_or_else(|| ReferralError::CodeNotFound(code_id.to_string()))?;

        if code.is_active {
            return Ok(code);
        }

        // 每个用户最多一个活跃推荐码，推荐码在活跃码之间唯一
        if self.repository.find_active_code_by_owner(&code.owner_user_id).await?.is_some()
            || self.repository.active_code_exists(&code.code).await?
        {
            return Err(ReferralError::ActiveCodeExists(code.owner_user_id));
        }

        match self.repository.set_code_active(&id, true).await {
            Ok(Some(code)) => {
                info!("🔓 推荐码已重新启用: code={}, owner={}", code.code, code.owner_user_id);
                Ok(code)
            }
            Ok(None) => Err(ReferralError::CodeNotFound(code_id.to_string())),
            Err(AppError::Conflict(_)) => Err(ReferralError::ActiveCodeExists(code.owner_user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn stats(&self, owner_user_id: &str) -> ReferralResult<ReferralStats> {
        let usages = self.repository.list_usages_by_referrer(owner_user_id).await?;

        Ok(ReferralStats::from_usages(&usages))
    }

    async fn list_usages(&self, owner_user_id: &str) -> ReferralResult<Vec<ReferralUsage>> {
        Ok(self.repository.list_usages_by_referrer(owner_user_id).await?)
    }

    async fn list_rewards(&self, beneficiary_user_id: &str) -> ReferralResult<Vec<ReferralReward>> {
        Ok(self.repository.list_rewards_by_beneficiary(beneficiary_user_id).await?)
    }

    async fn list_rewards_by_status(&self, status: RewardStatus) -> ReferralResult<Vec<ReferralReward>> {
        Ok(self.repository.list_rewards_by_status(status).await?)
    }

    async fn grant_reward(
        &self,
        beneficiary: Beneficiary,
        amount: i64,
        source: RewardSource,
        description: String,
    ) -> ReferralResult<ReferralReward> {
        if amount <= 0 {
            return Err(ReferralError::InvalidAmount(amount));
        }

        let reward = ReferralReward::pending(&beneficiary, amount, source, description, now_timestamp());
        let created = self
            .repository
            .insert_rewards(vec![reward])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReferralError::StoreUnavailable("reward insert returned nothing".to_string()))?;

        info!(
            "🎁 奖励已创建: beneficiary={}, amount={}, source={:?}",
            created.beneficiary_user_id, created.amount, created.source
        );
        Ok(created)
    }

    async fn record_booking_commission(
        &self,
        booking_user_id: &str,
        booking_amount: i64,
    ) -> ReferralResult<Vec<ReferralReward>> {
        if booking_amount < 0 {
            return Err(ReferralError::InvalidAmount(booking_amount));
        }

        let Some(first) = self.repository.find_usage_by_redeemer(booking_user_id).await? else {
            debug!("预订用户 {} 没有推荐人，跳过佣金", booking_user_id);
            return Ok(Vec::new());
        };

        let now = now_timestamp();
        let mut rewards = Vec::new();

        let first_amount = commission(booking_amount, self.policy.first_tier_pct);
        if first_amount > 0 {
            let beneficiary = self.beneficiary_of(&first.referrer_owner_id).await?;
            rewards.push(ReferralReward::pending(
                &beneficiary,
                first_amount,
                RewardSource::Referral,
                FIRST_TIER_DESCRIPTION.to_string(),
                now,
            ));
        }

        if let Some(second) = self.repository.find_usage_by_redeemer(&first.referrer_owner_id).await? {
            let second_amount = commission(booking_amount, self.policy.second_tier_pct);
            // 互相推荐时二级推荐人就是预订用户本人
            if second_amount > 0 && second.referrer_owner_id != booking_user_id {
                let beneficiary = self.beneficiary_of(&second.referrer_owner_id).await?;
                rewards.push(ReferralReward::pending(
                    &beneficiary,
                    second_amount,
                    RewardSource::Referral,
                    SECOND_TIER_DESCRIPTION.to_string(),
                    now,
                ));
            }
        }

        let created = self.repository.insert_rewards(rewards).await?;
        info!(
            "💰 预订佣金已记录: booking_user={}, amount={}, rewards={}",
            booking_user_id,
            booking_amount,
            created.len()
        );

        Ok(created)
    }
}
