#[cfg(test)]
mod referral_model_tests {
    use crate::referral::model::*;

    fn usage_with(status: UsageStatus, amount: i64) -> ReferralUsage {
        let code = ReferralCode::new("owner", "Owner", "owner@example.com", "OABC12".to_string(), 50, amount, 365, 0);
        let mut usage = ReferralUsage::pending(&code, &Beneficiary::new("redeemer", "Lee", "lee@example.com"), 0);
        usage.status = status;
        usage
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  abc123 "), Some("ABC123".to_string()));
        assert_eq!(normalize_code("AbC"), Some("ABC".to_string()));
        assert_eq!(normalize_code(""), None);
        assert_eq!(normalize_code("   "), None);
        assert_eq!(normalize_code("ABC-123"), None);
        assert_eq!(normalize_code("코드1"), None);
    }

    #[test]
    fn test_new_code_defaults() {
        let now = 1_700_000_000;
        let code = ReferralCode::new(
            "u1",
            "Hong",
            "hong@example.com",
            "HLX1Y2Z3ABCDE".to_string(),
            DEFAULT_MAX_USAGE,
            DEFAULT_REWARD_AMOUNT,
            DEFAULT_CODE_TTL_DAYS,
            now,
        );

        assert!(code.id.is_none());
        assert_eq!(code.usage_count, 0);
        assert_eq!(code.max_usage, 50);
        assert_eq!(code.reward_amount, 10000);
        assert!(code.is_active);
        assert_eq!(code.expires_at, Some(now + 365 * 24 * 60 * 60));
        assert!(!code.is_expired_at(now));
        assert!(code.is_expired_at(now + 365 * 24 * 60 * 60));
    }

    #[test]
    fn test_code_exhaustion() {
        let mut code = ReferralCode::new("u1", "Hong", "h@example.com", "HX".to_string(), 1, 10000, 365, 0);
        assert!(!code.is_exhausted());
        code.usage_count = 1;
        assert!(code.is_exhausted());
    }

    #[test]
    fn test_usage_copies_reward_amount() {
        let mut code = ReferralCode::new("u1", "Hong", "h@example.com", "HX".to_string(), 50, 7000, 365, 0);
        let usage = ReferralUsage::pending(&code, &Beneficiary::new("u2", "Kim", "k@example.com"), 5);

        // 之后修改推荐码金额不影响已有兑换记录
        code.reward_amount = 1;
        assert_eq!(usage.reward_amount, 7000);
        assert_eq!(usage.referrer_owner_id, "u1");
        assert_eq!(usage.referrer_code, "HX");
        assert_eq!(usage.status, UsageStatus::Pending);
        assert!(usage.reward_id.is_none());
    }

    #[test]
    fn test_redemption_reward_goes_to_owner() {
        let code = ReferralCode::new("u1", "Hong", "h@example.com", "HX".to_string(), 50, 10000, 365, 0);
        let reward = ReferralReward::for_redemption(&code, "Kim", 9);

        assert_eq!(reward.beneficiary_user_id, "u1");
        assert_eq!(reward.beneficiary_name, "Hong");
        assert_eq!(reward.amount, 10000);
        assert_eq!(reward.source, RewardSource::Referral);
        assert_eq!(reward.status, RewardStatus::Pending);
        assert_eq!(reward.description, "Kim님 추천 보상");
        assert!(reward.paid_at.is_none());
    }

    #[test]
    fn test_reward_status_parse() {
        assert_eq!(RewardStatus::parse(" Approved "), Some(RewardStatus::Approved));
        assert_eq!(RewardStatus::parse("expired"), None);
        assert_eq!(UsageStatus::from(RewardStatus::Paid), UsageStatus::Paid);
    }

    #[test]
    fn test_status_serialization_is_lowercase() {
        assert_eq!(serde_json::to_string(&RewardStatus::Approved).unwrap(), "\"approved\"");
        assert_eq!(serde_json::to_string(&UsageStatus::Expired).unwrap(), "\"expired\"");
        assert_eq!(serde_json::to_string(&RewardSource::Promotion).unwrap(), "\"promotion\"");
    }

    #[test]
    fn test_code_serializes_camel_case() {
        let code = ReferralCode::new("u1", "Hong", "h@example.com", "HX".to_string(), 50, 10000, 365, 0);
        let value = serde_json::to_value(&code).unwrap();

        assert!(value.get("_id").is_none());
        assert_eq!(value["ownerUserId"], "u1");
        assert_eq!(value["usageCount"], 0);
        assert_eq!(value["isActive"], true);
    }

    #[test]
    fn test_stats_aggregation() {
        let usages = vec![
            usage_with(UsageStatus::Pending, 10000),
            usage_with(UsageStatus::Pending, 5000),
            usage_with(UsageStatus::Approved, 10000),
            usage_with(UsageStatus::Paid, 10000),
            usage_with(UsageStatus::Expired, 10000),
        ];

        let stats = ReferralStats::from_usages(&usages);

        assert_eq!(stats.total_usages, 5);
        assert_eq!(stats.pending_usages, 2);
        assert_eq!(stats.approved_usages, 1);
        assert_eq!(stats.paid_usages, 1);
        assert_eq!(stats.expired_usages, 1);
        assert_eq!(stats.awaiting_approval_amount, 15000);
        assert_eq!(stats.earned_amount, 20000);
        assert_eq!(stats.paid_amount, 10000);
        assert_eq!(stats.pending_amount, 10000);
        assert_eq!(stats.level, ReferralLevel::Bronze);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ReferralLevel::from_successful(0), ReferralLevel::Bronze);
        assert_eq!(ReferralLevel::from_successful(5), ReferralLevel::Bronze);
        assert_eq!(ReferralLevel::from_successful(6), ReferralLevel::Silver);
        assert_eq!(ReferralLevel::from_successful(15), ReferralLevel::Silver);
        assert_eq!(ReferralLevel::from_successful(16), ReferralLevel::Gold);
    }
}
