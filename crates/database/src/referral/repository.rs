use crate::{
    referral::model::{ReferralCode, ReferralReward, ReferralUsage, RewardStatus, UsageStatus},
    Database,
};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument},
    ClientSession, IndexModel,
};
use std::{future::Future, sync::Arc};
use tracing::{debug, info, warn};
use utils::{AppError, AppResult};

pub type DynReferralRepository = Arc<dyn ReferralRepositoryTrait + Send + Sync>;

/// 发放奖励时记录的支付信息
#[derive(Debug, Clone, PartialEq)]
pub struct RewardSettlement {
    pub paid_at: u64,
    pub payment_method: String,
    pub payment_details: Option<String>,
}

// 推荐账本所需的全部存储操作，多文档写入必须是原子的
#[async_trait]
pub trait ReferralRepositoryTrait {
    // 插入推荐码，由仓库分配id
    async fn insert_code(&self, code: ReferralCode) -> AppResult<ReferralCode>;

    async fn find_code_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralCode>>;

    async fn find_active_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>>;

    // 只返回isActive=true的推荐码，code需已规范化
    async fn find_active_code_by_code(&self, code: &str) -> AppResult<Option<ReferralCode>>;

    // 不区分是否活跃，取该用户最近创建的推荐码(内部使用)
    async fn find_latest_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>>;

    async fn active_code_exists(&self, code: &str) -> AppResult<bool>;

    // 切换isActive，返回更新后的文档
    async fn set_code_active(&self, id: &ObjectId, active: bool) -> AppResult<Option<ReferralCode>>;

    async fn find_usage_by_redeemer(&self, redeemer_user_id: &str) -> AppResult<Option<ReferralUsage>>;

    // 按usedAt倒序
    async fn list_usages_by_referrer(&self, owner_user_id: &str) -> AppResult<Vec<ReferralUsage>>;

    // 原子批次：插入兑换记录 + usageCount自增1 + 插入奖励
    async fn record_redemption(
        &self,
        code_id: &ObjectId,
        usage: ReferralUsage,
        reward: ReferralReward,
    ) -> AppResult<(ReferralUsage, ReferralReward)>;

    // 原子批量插入奖励
    async fn insert_rewards(&self, rewards: Vec<ReferralReward>) -> AppResult<Vec<ReferralReward>>;

    async fn find_reward_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralReward>>;

    // 按createdAt倒序
    async fn list_rewards_by_beneficiary(&self, user_id: &str) -> AppResult<Vec<ReferralReward>>;

    async fn list_rewards_by_status(&self, status: RewardStatus) -> AppResult<Vec<ReferralReward>>;

    // 仅当奖励当前为from时推进到to，并同步推进rewardId关联的兑换记录
    // 奖励不处于from状态时返回None
    async fn advance_reward(
        &self,
        id: &ObjectId,
        from: RewardStatus,
        to: RewardStatus,
        settlement: Option<RewardSettlement>,
    ) -> AppResult<Option<ReferralReward>>;
}

/// 创建推荐相关集合的索引
pub async fn init_indexes(db: &Database) -> AppResult<()> {
    info!("🔧 初始化推荐集合索引...");

    let active_only = doc! { "isActive": true };
    let code_indexes = vec![
        IndexModel::builder()
            .keys(doc! { "code": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(active_only.clone())
                    .name("active_code_unique".to_string())
                    .build(),
            )
            .build(),
        IndexModel::builder()
            .keys(doc! { "ownerUserId": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(active_only)
                    .name("active_owner_unique".to_string())
                    .build(),
            )
            .build(),
    ];

    let usage_indexes = vec![
        IndexModel::builder()
            .keys(doc! { "redeemedByUserId": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("redeemedByUserId_unique".to_string())
                    .build(),
            )
            .build(),
        IndexModel::builder()
            .keys(doc! { "referrerOwnerId": 1, "usedAt": -1 })
            .options(IndexOptions::builder().name("referrer_usedAt".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "rewardId": 1 })
            .options(IndexOptions::builder().name("rewardId".to_string()).build())
            .build(),
    ];

    let reward_indexes = vec![
        IndexModel::builder()
            .keys(doc! { "beneficiaryUserId": 1, "createdAt": -1 })
            .options(IndexOptions::builder().name("beneficiary_createdAt".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(IndexOptions::builder().name("status".to_string()).build())
            .build(),
    ];

    db.referral_codes.create_indexes(code_indexes, None).await?;
    db.referral_usages.create_indexes(usage_indexes, None).await?;
    db.referral_rewards.create_indexes(reward_indexes, None).await?;

    info!("✅ 推荐集合索引创建成功");
    Ok(())
}

/// 整个事务的最多执行次数(含首次)
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;
/// 提交结果未知时的最多重试次数
const MAX_COMMIT_RETRIES: u32 = 3;

/// 写冲突等带TransientTransactionError标签的错误，整个事务可以重跑
fn is_transient_transaction_error(err: &AppError) -> bool {
    matches!(err, AppError::MongoError(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

/// 执行事务，遇到可重试错误时用新会话重跑
///
/// 每次尝试都必须自行开启会话和事务，失败的尝试已被服务端回滚
async fn run_transaction<T, F, Fut>(
    name: &str,
    is_retryable: fn(&AppError) -> bool,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempts = 1;
    loop {
        match attempt().await {
            Err(e) if attempts < MAX_TRANSACTION_ATTEMPTS && is_retryable(&e) => {
                warn!("⚠️ 事务冲突，重试 {}: 第{}次失败: {}", name, attempts, e);
                attempts += 1;
            }
            result => return result,
        }
    }
}

/// 提交结果未知时重试提交，commitTransaction是幂等的
async fn commit_with_retry(session: &mut ClientSession) -> mongodb::error::Result<()> {
    let mut retries = 0;
    loop {
        match session.commit_transaction().await {
            Err(e) if retries < MAX_COMMIT_RETRIES && e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                retries += 1;
                warn!("⚠️ 事务提交结果未知，重试提交: 第{}次: {}", retries, e);
            }
            result => return result,
        }
    }
}

/// 提交或回滚事务
async fn finish_transaction<T>(session: &mut ClientSession, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            commit_with_retry(session).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("⚠️ 事务回滚失败: {}", abort_err);
            }
            Err(e)
        }
    }
}

async fn write_redemption(
    db: &Database,
    session: &mut ClientSession,
    code_id: &ObjectId,
    usage: &ReferralUsage,
    reward: &ReferralReward,
) -> AppResult<()> {
    db.referral_usages.insert_one_with_session(usage, None, session).await?;

    // 字段级自增，不读取缓存值
    let incremented = db
        .referral_codes
        .update_one_with_session(
            doc! { "_id": *code_id, "isActive": true },
            doc! { "$inc": { "usageCount": 1 } },
            None,
            session,
        )
        .await?;

    if incremented.matched_count == 0 {
        return Err(AppError::NotFound(format!("Active referral code {} not found.", code_id)));
    }

    db.referral_rewards.insert_one_with_session(reward, None, session).await?;

    Ok(())
}

async fn write_reward_advance(
    db: &Database,
    session: &mut ClientSession,
    id: &ObjectId,
    from: RewardStatus,
    to: RewardStatus,
    settlement: Option<&RewardSettlement>,
) -> AppResult<Option<ReferralReward>> {
    let mut reward_set = doc! { "status": to.as_str() };
    let mut usage_set = doc! { "status": UsageStatus::from(to).as_str() };

    if let Some(settlement) = settlement {
        reward_set.insert("paidAt", settlement.paid_at as i64);
        reward_set.insert("paymentMethod", settlement.payment_method.clone());
        if let Some(details) = &settlement.payment_details {
            reward_set.insert("paymentDetails", details.clone());
        }
        usage_set.insert("paidAt", settlement.paid_at as i64);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = db
        .referral_rewards
        .find_one_and_update_with_session(
            doc! { "_id": *id, "status": from.as_str() },
            doc! { "$set": reward_set },
            options,
            session,
        )
        .await?;

    if updated.is_none() {
        return Ok(None);
    }

    let usages = db
        .referral_usages
        .update_many_with_session(
            doc! { "rewardId": *id, "status": UsageStatus::from(from).as_str() },
            doc! { "$set": usage_set },
            None,
            session,
        )
        .await?;

    debug!("奖励 {} {} -> {}，同步兑换记录 {} 条", id, from, to, usages.modified_count);

    Ok(updated)
}

impl Database {
    async fn find_one_code(&self, filter: Document, options: Option<FindOneOptions>) -> AppResult<Option<ReferralCode>> {
        let code = self.referral_codes.find_one(filter, options).await?;
        Ok(code)
    }
}

#[async_trait]
impl ReferralRepositoryTrait for Database {
    async fn insert_code(&self, mut code: ReferralCode) -> AppResult<ReferralCode> {
        code.id = Some(ObjectId::new());
        self.referral_codes.insert_one(&code, None).await?;

        Ok(code)
    }

    async fn find_code_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralCode>> {
        self.find_one_code(doc! { "_id": *id }, None).await
    }

    async fn find_active_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>> {
        self.find_one_code(doc! { "ownerUserId": owner_user_id, "isActive": true }, None)
            .await
    }

    async fn find_active_code_by_code(&self, code: &str) -> AppResult<Option<ReferralCode>> {
        self.find_one_code(doc! { "code": code, "isActive": true }, None).await
    }

    async fn find_latest_code_by_owner(&self, owner_user_id: &str) -> AppResult<Option<ReferralCode>> {
        let options = FindOneOptions::builder().sort(doc! { "createdAt": -1 }).build();
        self.find_one_code(doc! { "ownerUserId": owner_user_id }, Some(options)).await
    }

    async fn active_code_exists(&self, code: &str) -> AppResult<bool> {
        let count = self
            .referral_codes
            .count_documents(doc! { "code": code, "isActive": true }, None)
            .await?;

        Ok(count > 0)
    }

    async fn set_code_active(&self, id: &ObjectId, active: bool) -> AppResult<Option<ReferralCode>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let code = self
            .referral_codes
            .find_one_and_update(doc! { "_id": *id }, doc! { "$set": { "isActive": active } }, options)
            .await?;

        Ok(code)
    }

    async fn find_usage_by_redeemer(&self, redeemer_user_id: &str) -> AppResult<Option<ReferralUsage>> {
        let usage = self
            .referral_usages
            .find_one(doc! { "redeemedByUserId": redeemer_user_id }, None)
            .await?;

        Ok(usage)
    }

    async fn list_usages_by_referrer(&self, owner_user_id: &str) -> AppResult<Vec<ReferralUsage>> {
        let options = FindOptions::builder().sort(doc! { "usedAt": -1 }).build();
        let cursor = self
            .referral_usages
            .find(doc! { "referrerOwnerId": owner_user_id }, options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn record_redemption(
        &self,
        code_id: &ObjectId,
        mut usage: ReferralUsage,
        mut reward: ReferralReward,
    ) -> AppResult<(ReferralUsage, ReferralReward)> {
        let reward_id = ObjectId::new();
        reward.id = Some(reward_id);
        usage.id = Some(ObjectId::new());
        usage.reward_id = Some(reward_id);

        let (usage_ref, reward_ref) = (&usage, &reward);
        run_transaction("record_redemption", is_transient_transaction_error, move || async move {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;

            let outcome = write_redemption(self, &mut session, code_id, usage_ref, reward_ref).await;
            finish_transaction(&mut session, outcome).await
        })
        .await?;

        info!(
            "✅ 推荐码兑换已记录: code={}, redeemer={}, reward={}",
            usage.referrer_code, usage.redeemed_by_user_id, reward_id
        );

        Ok((usage, reward))
    }

    async fn insert_rewards(&self, mut rewards: Vec<ReferralReward>) -> AppResult<Vec<ReferralReward>> {
        if rewards.is_empty() {
            return Ok(rewards);
        }

        for reward in rewards.iter_mut() {
            reward.id = Some(ObjectId::new());
        }

        let rewards_ref = &rewards;
        run_transaction("insert_rewards", is_transient_transaction_error, move || async move {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;

            let outcome = self
                .referral_rewards
                .insert_many_with_session(rewards_ref, None, &mut session)
                .await
                .map(|_| ())
                .map_err(AppError::from);
            finish_transaction(&mut session, outcome).await
        })
        .await?;

        Ok(rewards)
    }

    async fn find_reward_by_id(&self, id: &ObjectId) -> AppResult<Option<ReferralReward>> {
        let reward = self.referral_rewards.find_one(doc! { "_id": *id }, None).await?;

        Ok(reward)
    }

    async fn list_rewards_by_beneficiary(&self, user_id: &str) -> AppResult<Vec<ReferralReward>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self
            .referral_rewards
            .find(doc! { "beneficiaryUserId": user_id }, options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn list_rewards_by_status(&self, status: RewardStatus) -> AppResult<Vec<ReferralReward>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        let cursor = self
            .referral_rewards
            .find(doc! { "status": status.as_str() }, options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn advance_reward(
        &self,
        id: &ObjectId,
        from: RewardStatus,
        to: RewardStatus,
        settlement: Option<RewardSettlement>,
    ) -> AppResult<Option<ReferralReward>> {
        let settlement = settlement.as_ref();
        run_transaction("advance_reward", is_transient_transaction_error, move || async move {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;

            let outcome = write_reward_advance(self, &mut session, id, from, to, settlement).await;
            finish_transaction(&mut session, outcome).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry_unavailable(err: &AppError) -> bool {
        matches!(err, AppError::StoreUnavailable(_))
    }

    #[tokio::test]
    async fn test_transaction_retried_until_success() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result = run_transaction("test", retry_unavailable, move || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(AppError::StoreUnavailable("write conflict".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transaction_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result: AppResult<()> = run_transaction("test", retry_unavailable, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(AppError::StoreUnavailable("write conflict".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_TRANSACTION_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_not_retried() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let result: AppResult<()> = run_transaction("test", is_transient_transaction_error, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Conflict("Duplicate key".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unlabelled_mongo_error_is_not_transient() {
        let err = AppError::MongoError(mongodb::error::Error::custom("boom"));

        assert!(!is_transient_transaction_error(&err));
        assert!(!is_transient_transaction_error(&AppError::StoreUnavailable("down".to_string())));
    }
}
