use crate::{
    dtos::reward_dto::{BookingCommissionDto, GrantRewardDto, PayRewardDto, ReferralRewardResponse},
    extractors::validation_extractor::ValidationExtractor,
    services::{referral::ReferralResult, Services},
};
use axum::{
    extract::Path,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use database::referral_model::{Beneficiary, RewardStatus};
use utils::AppError;

/// 审批奖励 pending -> approved
#[utoipa::path(
    post,
    path = "/api/v1/reward/{id}/approve",
    tag = "reward",
    params(
        ("id" = String, Path, description = "奖励ID")
    ),
    responses(
        (status = 200, description = "已审批", body = ReferralRewardResponse),
        (status = 404, description = "奖励不存在"),
        (status = 409, description = "奖励不是pending状态")
    )
)]
pub async fn approve_reward(
    Extension(services): Extension<Services>,
    Path(id): Path<String>,
) -> ReferralResult<Json<ReferralRewardResponse>> {
    let reward = services.referral.approve_reward(&id).await?;

    Ok(Json(reward.into()))
}

/// 支付奖励 approved -> paid
#[utoipa::path(
    post,
    path = "/api/v1/reward/{id}/pay",
    tag = "reward",
    request_body = PayRewardDto,
    params(
        ("id" = String, Path, description = "奖励ID")
    ),
    responses(
        (status = 200, description = "已支付", body = ReferralRewardResponse),
        (status = 404, description = "奖励不存在"),
        (status = 409, description = "奖励不是approved状态")
    )
)]
pub async fn pay_reward(
    Extension(services): Extension<Services>,
    Path(id): Path<String>,
    ValidationExtractor(req): ValidationExtractor<PayRewardDto>,
) -> ReferralResult<Json<ReferralRewardResponse>> {
    let reward = services
        .referral
        .pay_reward(&id, &req.payment_method, req.payment_details)
        .await?;

    Ok(Json(reward.into()))
}

/// 用户的奖励列表，按时间倒序
#[utoipa::path(
    get,
    path = "/api/v1/reward/beneficiary/{user_id}",
    tag = "reward",
    params(
        ("user_id" = String, Path, description = "受益人ID")
    ),
    responses(
        (status = 200, description = "奖励列表", body = Vec<ReferralRewardResponse>)
    )
)]
pub async fn list_rewards_by_beneficiary(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> ReferralResult<Json<Vec<ReferralRewardResponse>>> {
    let rewards = services.referral.list_rewards(&user_id).await?;

    Ok(Json(rewards.into_iter().map(ReferralRewardResponse::from).collect()))
}

/// 按状态列出奖励(管理端待处理队列)
#[utoipa::path(
    get,
    path = "/api/v1/reward/status/{status}",
    tag = "reward",
    params(
        ("status" = String, Path, description = "pending | approved | paid")
    ),
    responses(
        (status = 200, description = "奖励列表，按创建时间正序", body = Vec<ReferralRewardResponse>),
        (status = 400, description = "未知状态")
    )
)]
pub async fn list_rewards_by_status(
    Extension(services): Extension<Services>,
    Path(status): Path<String>,
) -> Response {
    let Some(status) = RewardStatus::parse(&status) else {
        return AppError::BadRequest(format!("Unknown reward status: {}", status)).into_response();
    };

    match services.referral.list_rewards_by_status(status).await {
        Ok(rewards) => Json(
            rewards
                .into_iter()
                .map(ReferralRewardResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 手动发放奖励
#[utoipa::path(
    post,
    path = "/api/v1/reward/grant",
    tag = "reward",
    request_body = GrantRewardDto,
    responses(
        (status = 200, description = "已创建pending奖励", body = ReferralRewardResponse),
        (status = 400, description = "金额必须大于0")
    )
)]
pub async fn grant_reward(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<GrantRewardDto>,
) -> ReferralResult<Json<ReferralRewardResponse>> {
    let beneficiary = Beneficiary::new(
        req.beneficiary_user_id.trim(),
        &req.beneficiary_name,
        &req.beneficiary_email,
    );
    let reward = services
        .referral
        .grant_reward(beneficiary, req.amount, req.source, req.description)
        .await?;

    Ok(Json(reward.into()))
}

/// 记录预订佣金
#[utoipa::path(
    post,
    path = "/api/v1/reward/commission",
    tag = "reward",
    request_body = BookingCommissionDto,
    responses(
        (status = 200, description = "创建的佣金奖励，可能为空", body = Vec<ReferralRewardResponse>)
    )
)]
pub async fn record_commission(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<BookingCommissionDto>,
) -> ReferralResult<Json<Vec<ReferralRewardResponse>>> {
    let rewards = services
        .referral
        .record_booking_commission(req.booking_user_id.trim(), req.booking_amount)
        .await?;

    Ok(Json(rewards.into_iter().map(ReferralRewardResponse::from).collect()))
}

pub struct RewardController;
impl RewardController {
    pub fn app() -> Router {
        Router::new()
            .route("/grant", post(grant_reward))
            .route("/commission", post(record_commission))
            .route("/beneficiary/:user_id", get(list_rewards_by_beneficiary))
            .route("/status/:status", get(list_rewards_by_status))
            .route("/:id/approve", post(approve_reward))
            .route("/:id/pay", post(pay_reward))
    }
}
