use crate::referral::{
    model::{ReferralCode, ReferralReward, ReferralUsage, RewardStatus, UsageStatus},
    repository::{ReferralRepositoryTrait, RewardSettlement},
};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use utils::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    codes: Vec<ReferralCode>,
    usages: Vec<ReferralUsage>,
    rewards: Vec<ReferralReward>,
}

/// 进程内推荐仓库
///
/// 每次调用在整个过程中持有同一把锁，批量写入要么全部生效要么全部不生效。
/// 同时模拟MongoDB上的唯一索引(活跃推荐码、活跃所有者、兑换用户)。
#[derive(Debug, Default)]
pub struct MemoryReferralRepository {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryReferralRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 切换为不可用状态，之后的所有调用都返回StoreUnavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// (推荐码, 兑换记录, 奖励) 数量
    pub async fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().await;
        (state.codes.len(), state.usages.len(), state.rewards.len())
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

fn newest_first<T, F>(items: impl Iterator<Item = T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> u64,
{
    // 先逆序再稳定排序，时间相同时后插入的排在前面
    let mut items: Vec<T> = items.collect();
    items.reverse();
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl ReferralRepositoryTrait for MemoryReferralRepository {
    async fn insert_code(&self, mut code: ReferralCode) -> AppResult<ReferralCode> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;

        if code.is_active {
            if state.codes.iter().any(|c| c.is_active && c.code == code.code) {
                return Err(AppError::Conflict(format!("Active code {} already exists.", code.code)));
            }
            if state
                .codes
                .iter()
                .any(|c| c.is_active && c.owner_user_id == code.owner_user_id)
            {
                return Err(AppError::Conflict(format!(
                    "User {} already owns an active code.",
                    code.owner_user_id
                )));
            }
        }

        code.id = Some(ObjectId::new());
        state.codes.push(code.clone());

        Ok(code)
    }

    async fn find_code_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralCode>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state.codes.iter().find(|c| c.id.as_ref() == Some(id)).cloned())
    }

    async fn find_active_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state
            .codes
            .iter()
            .find(|c| c.is_active && c.owner_user_id == owner_user_id)
            .cloned())
    }

    async fn find_active_code_by_code(&self, code: &str) -> AppResult<Option<ReferralCode>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state.codes.iter().find(|c| c.is_active && c.code == code).cloned())
    }

    async fn find_latest_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        let owned = state.codes.iter().filter(|c| c.owner_user_id == owner_user_id).cloned();
        Ok(newest_first(owned, |c| c.created_at).into_iter().next())
    }

    async fn active_code_exists(&self, code: &str) -> AppResult<bool> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state.codes.iter().any(|c| c.is_active && c.code == code))
    }

    async fn set_code_active(&self, id: &ObjectId, active: bool) -> AppResult<Option<ReferralCode>> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;

        let Some(index) = state.codes.iter().position(|c| c.id.as_ref() == Some(id)) else {
            return Ok(None);
        };

        if active {
            let target = &state.codes[index];
            let clash = state.codes.iter().enumerate().any(|(i, c)| {
                i != index && c.is_active && (c.code == target.code || c.owner_user_id == target.owner_user_id)
            });
            if clash {
                return Err(AppError::Conflict(format!("Code {} clashes with an active code.", target.code)));
            }
        }

        state.codes[index].is_active = active;
        Ok(Some(state.codes[index].clone()))
    }

    async fn find_usage_by_redeemer(&self, redeemer_user_id: &str) -> AppResult<Option<ReferralUsage>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state
            .usages
            .iter()
            .find(|u| u.redeemed_by_user_id == redeemer_user_id)
            .cloned())
    }

    async fn list_usages_by_referrer(&self, owner_user_id: &str) -> AppResult<Vec<ReferralUsage>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        let usages = state
            .usages
            .iter()
            .filter(|u| u.referrer_owner_id == owner_user_id)
            .cloned();
        Ok(newest_first(usages, |u| u.used_at))
    }

    async fn record_redemption(
        &self,
        code_id: &ObjectId,
        mut usage: ReferralUsage,
        mut reward: ReferralReward,
    ) -> AppResult<(ReferralUsage, ReferralReward)> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;

        // 所有检查在任何写入之前完成
        if state
            .usages
            .iter()
            .any(|u| u.redeemed_by_user_id == usage.redeemed_by_user_id)
        {
            return Err(AppError::Conflict(format!(
                "User {} already redeemed a referral code.",
                usage.redeemed_by_user_id
            )));
        }

        let Some(index) = state
            .codes
            .iter()
            .position(|c| c.is_active && c.id.as_ref() == Some(code_id))
        else {
            return Err(AppError::NotFound(format!("Active referral code {} not found.", code_id)));
        };

        let reward_id = ObjectId::new();
        reward.id = Some(reward_id);
        usage.id = Some(ObjectId::new());
        usage.reward_id = Some(reward_id);

        state.codes[index].usage_count += 1;
        state.usages.push(usage.clone());
        state.rewards.push(reward.clone());

        Ok((usage, reward))
    }

    async fn insert_rewards(&self, mut rewards: Vec<ReferralReward>) -> AppResult<Vec<ReferralReward>> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;

        for reward in rewards.iter_mut() {
            reward.id = Some(ObjectId::new());
        }
        state.rewards.extend(rewards.iter().cloned());

        Ok(rewards)
    }

    async fn find_reward_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralReward>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        Ok(state.rewards.iter().find(|r| r.id.as_ref() == Some(id)).cloned())
    }

    async fn list_rewards_by_beneficiary(&self, user_id: &str) -> AppResult<Vec<ReferralReward>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        let rewards = state
            .rewards
            .iter()
            .filter(|r| r.beneficiary_user_id == user_id)
            .cloned();
        Ok(newest_first(rewards, |r| r.created_at))
    }

    async fn list_rewards_by_status(&self, status: RewardStatus) -> AppResult<Vec<ReferralReward>> {
        self.ensure_available()?;
        let state = self.state.lock().await;

        let mut rewards: Vec<ReferralReward> = state.rewards.iter().filter(|r| r.status == status).cloned().collect();
        rewards.sort_by_key(|r| r.created_at);
        Ok(rewards)
    }

    async fn advance_reward(
        &self,
        id: &ObjectId,
        from: RewardStatus,
        to: RewardStatus,
        settlement: Option<RewardSettlement>,
    ) -> AppResult<Option<ReferralReward>> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;

        let Some(reward) = state
            .rewards
            .iter_mut()
            .find(|r| r.id.as_ref() == Some(id) && r.status == from)
        else {
            return Ok(None);
        };

        reward.status = to;
        if let Some(settlement) = &settlement {
            reward.paid_at = Some(settlement.paid_at);
            reward.payment_method = Some(settlement.payment_method.clone());
            if settlement.payment_details.is_some() {
                reward.payment_details = settlement.payment_details.clone();
            }
        }
        let updated = reward.clone();

        let (usage_from, usage_to) = (UsageStatus::from(from), UsageStatus::from(to));
        for usage in state
            .usages
            .iter_mut()
            .filter(|u| u.reward_id.as_ref() == Some(id) && u.status == usage_from)
        {
            usage.status = usage_to;
            if let Some(settlement) = &settlement {
                usage.paid_at = Some(settlement.paid_at);
            }
        }

        Ok(Some(updated))
    }
}
