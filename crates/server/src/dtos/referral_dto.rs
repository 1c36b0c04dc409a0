use super::validate_not_blank;
use database::referral_model::{ReferralCode, ReferralUsage, UsageStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// 获取或生成推荐码的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueCodeDto {
    /// 推荐码所有者ID
    #[validate(length(min = 1, max = 128), custom = "validate_not_blank")]
    pub owner_user_id: String,

    /// 所有者显示名，首字母用于生成推荐码
    #[validate(length(max = 128))]
    #[serde(default)]
    pub owner_name: String,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub owner_email: String,
}

/// 兑换推荐码的请求体
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCodeDto {
    /// 推荐码，大小写不敏感
    #[validate(length(max = 64))]
    pub code: String,

    #[validate(length(min = 1, max = 128), custom = "validate_not_blank")]
    pub redeemer_user_id: String,

    #[validate(length(max = 128))]
    #[serde(default)]
    pub redeemer_name: String,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub redeemer_email: String,
}

/// 推荐码响应DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodeResponse {
    /// 推荐码文档ID(hex)，停用/启用时使用
    pub id: Option<String>,
    pub owner_user_id: String,
    pub owner_name: String,
    pub owner_email: String,
    pub code: String,
    pub usage_count: u32,
    pub max_usage: u32,
    pub reward_amount: i64,
    pub is_active: bool,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

impl From<ReferralCode> for ReferralCodeResponse {
    fn from(code: ReferralCode) -> Self {
        Self {
            id: code.id.map(|id| id.to_hex()),
            owner_user_id: code.owner_user_id,
            owner_name: code.owner_name,
            owner_email: code.owner_email,
            code: code.code,
            usage_count: code.usage_count,
            max_usage: code.max_usage,
            reward_amount: code.reward_amount,
            is_active: code.is_active,
            created_at: code.created_at,
            expires_at: code.expires_at,
        }
    }
}

/// 兑换记录响应DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralUsageResponse {
    pub id: Option<String>,
    pub referrer_owner_id: String,
    pub referrer_code: String,
    pub redeemed_by_user_id: String,
    pub redeemed_by_name: String,
    pub redeemed_by_email: String,
    pub reward_amount: i64,
    /// 同一次兑换产生的奖励ID(hex)
    pub reward_id: Option<String>,
    pub status: UsageStatus,
    pub used_at: u64,
    pub paid_at: Option<u64>,
}

impl From<ReferralUsage> for ReferralUsageResponse {
    fn from(usage: ReferralUsage) -> Self {
        Self {
            id: usage.id.map(|id| id.to_hex()),
            referrer_owner_id: usage.referrer_owner_id,
            referrer_code: usage.referrer_code,
            redeemed_by_user_id: usage.redeemed_by_user_id,
            redeemed_by_name: usage.redeemed_by_name,
            redeemed_by_email: usage.redeemed_by_email,
            reward_amount: usage.reward_amount,
            reward_id: usage.reward_id.map(|id| id.to_hex()),
            status: usage.status,
            used_at: usage.used_at,
            paid_at: usage.paid_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_code_dto_requires_owner() {
        let dto: IssueCodeDto = serde_json::from_str(r#"{"ownerUserId":"u1"}"#).unwrap();
        assert!(dto.validate().is_ok());
        assert_eq!(dto.owner_name, "");

        let blank = IssueCodeDto {
            owner_user_id: "   ".to_string(),
            ..IssueCodeDto::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_redeem_dto_rejects_oversized_code() {
        let dto = RedeemCodeDto {
            code: "A".repeat(65),
            redeemer_user_id: "u2".to_string(),
            ..RedeemCodeDto::default()
        };
        assert!(dto.validate().is_err());

        // 格式错误的推荐码交给账本返回InvalidCode
        let dto = RedeemCodeDto {
            code: "not-a-code".to_string(),
            redeemer_user_id: "u2".to_string(),
            ..RedeemCodeDto::default()
        };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_usage_response_uses_hex_ids() {
        use database::referral_model::Beneficiary;
        use mongodb::bson::oid::ObjectId;

        let code = ReferralCode::new("owner", "Owner", "o@example.com", "OABC".to_string(), 50, 10000, 365, 0);
        let mut usage = ReferralUsage::pending(&code, &Beneficiary::new("u2", "Lee", "lee@example.com"), 0);
        let usage_id = ObjectId::new();
        let reward_id = ObjectId::new();
        usage.id = Some(usage_id);
        usage.reward_id = Some(reward_id);

        let value = serde_json::to_value(ReferralUsageResponse::from(usage)).unwrap();

        assert_eq!(value["id"], usage_id.to_hex());
        assert_eq!(value["rewardId"], reward_id.to_hex());
        assert_eq!(value["redeemedByUserId"], "u2");
        assert!(value.get("_id").is_none());
    }

    #[test]
    fn test_code_response_without_id() {
        let code = ReferralCode::new("owner", "Owner", "o@example.com", "OABC".to_string(), 50, 10000, 365, 0);

        let value = serde_json::to_value(ReferralCodeResponse::from(code)).unwrap();

        assert!(value["id"].is_null());
        assert_eq!(value["code"], "OABC");
        assert_eq!(value["isActive"], true);
    }
}
