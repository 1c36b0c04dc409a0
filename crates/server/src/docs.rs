use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Referral Ledger API",
        description = "推荐码发放、兑换以及奖励审批/支付的后台 API 文档",
        version = "1.0.0"
    ),
    paths(
        // System health check
        crate::api::health,
        // Referral endpoints
        crate::api::referral_controller::issue_code,
        crate::api::referral_controller::lookup_code,
        crate::api::referral_controller::redeem_code,
        crate::api::referral_controller::deactivate_code,
        crate::api::referral_controller::reactivate_code,
        crate::api::referral_controller::get_stats,
        crate::api::referral_controller::list_usages,
        crate::api::referral_controller::get_redemption,
        // Reward endpoints
        crate::api::reward_controller::approve_reward,
        crate::api::reward_controller::pay_reward,
        crate::api::reward_controller::list_rewards_by_beneficiary,
        crate::api::reward_controller::list_rewards_by_status,
        crate::api::reward_controller::grant_reward,
        crate::api::reward_controller::record_commission,
    ),
    components(
        schemas(
            // Database models
            database::referral_model::ReferralStats,
            database::referral_model::ReferralLevel,
            database::referral_model::UsageStatus,
            database::referral_model::RewardStatus,
            database::referral_model::RewardSource,
            // DTOs
            crate::dtos::referral_dto::IssueCodeDto,
            crate::dtos::referral_dto::RedeemCodeDto,
            crate::dtos::referral_dto::ReferralCodeResponse,
            crate::dtos::referral_dto::ReferralUsageResponse,
            crate::dtos::reward_dto::PayRewardDto,
            crate::dtos::reward_dto::GrantRewardDto,
            crate::dtos::reward_dto::BookingCommissionDto,
            crate::dtos::reward_dto::ReferralRewardResponse,
        )
    ),
    tags(
        (name = "系统状态", description = "系统健康检查和状态监控"),
        (name = "referral", description = "推荐码发放、查询和兑换"),
        (name = "reward", description = "奖励审批、支付和发放")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_referral_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        assert!(paths.contains_key("/api/v1/referral/redeem"));
        assert!(paths.contains_key("/api/v1/reward/{id}/pay"));
        assert!(paths.contains_key("/api/v1/referral/codes/{code}"));

        let schemas = &doc.components.as_ref().unwrap().schemas;
        assert!(schemas.contains_key("ReferralCodeResponse"));
        assert!(schemas.contains_key("ReferralRewardResponse"));
    }
}
