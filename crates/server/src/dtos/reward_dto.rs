use super::validate_not_blank;
use database::referral_model::{ReferralReward, RewardSource, RewardStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 支付奖励的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayRewardDto {
    /// 支付方式(bank_transfer, point, ...)
    #[validate(length(min = 1, max = 64), custom = "validate_not_blank")]
    pub payment_method: String,

    #[validate(length(max = 1024))]
    pub payment_details: Option<String>,
}

/// 手动发放奖励(奖金/促销)的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantRewardDto {
    #[validate(length(min = 1, max = 128), custom = "validate_not_blank")]
    pub beneficiary_user_id: String,

    #[serde(default)]
    pub beneficiary_name: String,

    #[serde(default)]
    pub beneficiary_email: String,

    /// 金额必须大于0，由账本校验
    pub amount: i64,

    pub source: RewardSource,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub description: String,
}

/// 预订完成后记录推荐佣金的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingCommissionDto {
    #[validate(length(min = 1, max = 128), custom = "validate_not_blank")]
    pub booking_user_id: String,

    #[validate(range(min = 0))]
    pub booking_amount: i64,
}

/// 奖励响应DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRewardResponse {
    /// 奖励ID(hex)，审批/支付时使用
    pub id: Option<String>,
    pub beneficiary_user_id: String,
    pub beneficiary_name: String,
    pub beneficiary_email: String,
    pub amount: i64,
    pub source: RewardSource,
    pub status: RewardStatus,
    pub description: String,
    pub created_at: u64,
    pub paid_at: Option<u64>,
    pub payment_method: Option<String>,
    pub payment_details: Option<String>,
}

impl From<ReferralReward> for ReferralRewardResponse {
    fn from(reward: ReferralReward) -> Self {
        Self {
            id: reward.id.map(|id| id.to_hex()),
            beneficiary_user_id: reward.beneficiary_user_id,
            beneficiary_name: reward.beneficiary_name,
            beneficiary_email: reward.beneficiary_email,
            amount: reward.amount,
            source: reward.source,
            status: reward.status,
            description: reward.description,
            created_at: reward.created_at,
            paid_at: reward.paid_at,
            payment_method: reward.payment_method,
            payment_details: reward.payment_details,
        }
    }
}
