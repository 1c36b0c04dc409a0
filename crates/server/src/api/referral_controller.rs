use crate::{
    dtos::referral_dto::{IssueCodeDto, RedeemCodeDto, ReferralCodeResponse, ReferralUsageResponse},
    extractors::validation_extractor::ValidationExtractor,
    services::{
        referral::{ReferralError, ReferralResult},
        Services,
    },
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Json, Router,
};
use database::referral_model::ReferralStats;

/// 获取或生成推荐码
///
/// 用户已有活跃推荐码时原样返回
#[utoipa::path(
    post,
    path = "/api/v1/referral/codes",
    tag = "referral",
    request_body = IssueCodeDto,
    responses(
        (status = 200, description = "用户的活跃推荐码", body = ReferralCodeResponse),
        (status = 400, description = "请求参数错误"),
        (status = 500, description = "推荐码生成次数耗尽")
    )
)]
pub async fn issue_code(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<IssueCodeDto>,
) -> ReferralResult<Json<ReferralCodeResponse>> {
    let code = services
        .referral
        .issue_or_get_code(req.owner_user_id.trim(), &req.owner_name, &req.owner_email)
        .await?;

    Ok(Json(code.into()))
}

/// 查询推荐码
#[utoipa::path(
    get,
    path = "/api/v1/referral/codes/{code}",
    tag = "referral",
    params(
        ("code" = String, Path, description = "推荐码，大小写不敏感")
    ),
    responses(
        (status = 200, description = "活跃且未过期的推荐码", body = ReferralCodeResponse),
        (status = 404, description = "推荐码不存在、已停用或已过期")
    )
)]
pub async fn lookup_code(
    Extension(services): Extension<Services>,
    Path(code): Path<String>,
) -> ReferralResult<Json<ReferralCodeResponse>> {
    match services.referral.lookup_by_code(&code).await? {
        Some(found) => Ok(Json(found.into())),
        None => Err(ReferralError::CodeNotFound(code)),
    }
}

/// 兑换推荐码
#[utoipa::path(
    post,
    path = "/api/v1/referral/redeem",
    tag = "referral",
    request_body = RedeemCodeDto,
    responses(
        (status = 200, description = "兑换成功，返回兑换记录", body = ReferralUsageResponse),
        (status = 400, description = "推荐码无效"),
        (status = 409, description = "该用户已兑换过推荐码"),
        (status = 422, description = "自荐、次数用尽或推荐码已过期"),
        (status = 503, description = "存储不可用，重试前先查询兑换记录")
    )
)]
pub async fn redeem_code(
    Extension(services): Extension<Services>,
    ValidationExtractor(req): ValidationExtractor<RedeemCodeDto>,
) -> ReferralResult<Json<ReferralUsageResponse>> {
    let usage = services
        .referral
        .redeem(
            &req.code,
            req.redeemer_user_id.trim(),
            &req.redeemer_name,
            &req.redeemer_email,
        )
        .await?;

    Ok(Json(usage.into()))
}

/// 停用推荐码
#[utoipa::path(
    post,
    path = "/api/v1/referral/codes/{id}/deactivate",
    tag = "referral",
    params(
        ("id" = String, Path, description = "推荐码文档ID")
    ),
    responses(
        (status = 200, description = "已停用", body = ReferralCodeResponse),
        (status = 404, description = "推荐码不存在")
    )
)]
pub async fn deactivate_code(
    Extension(services): Extension<Services>,
    Path(id): Path<String>,
) -> ReferralResult<Json<ReferralCodeResponse>> {
    let code = services.referral.deactivate(&id).await?;

    Ok(Json(code.into()))
}

/// 重新启用推荐码
#[utoipa::path(
    post,
    path = "/api/v1/referral/codes/{id}/reactivate",
    tag = "referral",
    params(
        ("id" = String, Path, description = "推荐码文档ID")
    ),
    responses(
        (status = 200, description = "已启用", body = ReferralCodeResponse),
        (status = 404, description = "推荐码不存在"),
        (status = 409, description = "用户已有其他活跃推荐码")
    )
)]
pub async fn reactivate_code(
    Extension(services): Extension<Services>,
    Path(id): Path<String>,
) -> ReferralResult<Json<ReferralCodeResponse>> {
    let code = services.referral.reactivate(&id).await?;

    Ok(Json(code.into()))
}

/// 推荐统计
#[utoipa::path(
    get,
    path = "/api/v1/referral/stats/{user_id}",
    tag = "referral",
    params(
        ("user_id" = String, Path, description = "推荐人ID")
    ),
    responses(
        (status = 200, description = "按状态汇总的兑换次数和金额", body = ReferralStats)
    )
)]
pub async fn get_stats(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> ReferralResult<Json<ReferralStats>> {
    let stats = services.referral.stats(&user_id).await?;

    Ok(Json(stats))
}

/// 推荐人的兑换记录，按时间倒序
#[utoipa::path(
    get,
    path = "/api/v1/referral/usages/{user_id}",
    tag = "referral",
    params(
        ("user_id" = String, Path, description = "推荐人ID")
    ),
    responses(
        (status = 200, description = "兑换记录列表", body = Vec<ReferralUsageResponse>)
    )
)]
pub async fn list_usages(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> ReferralResult<Json<Vec<ReferralUsageResponse>>> {
    let usages = services.referral.list_usages(&user_id).await?;

    Ok(Json(usages.into_iter().map(ReferralUsageResponse::from).collect()))
}

/// 查询用户是否已兑换过推荐码
#[utoipa::path(
    get,
    path = "/api/v1/referral/redemption/{user_id}",
    tag = "referral",
    params(
        ("user_id" = String, Path, description = "兑换用户ID")
    ),
    responses(
        (status = 200, description = "兑换记录，未兑换时为null", body = ReferralUsageResponse)
    )
)]
pub async fn get_redemption(
    Extension(services): Extension<Services>,
    Path(user_id): Path<String>,
) -> ReferralResult<Json<Option<ReferralUsageResponse>>> {
    let usage = services.referral.redemption_for(&user_id).await?;

    Ok(Json(usage.map(ReferralUsageResponse::from)))
}

pub struct ReferralController;
impl ReferralController {
    pub fn app() -> Router {
        Router::new()
            .route("/codes", post(issue_code))
            .route("/codes/:code", get(lookup_code))
            .route("/codes/:code/deactivate", post(deactivate_code))
            .route("/codes/:code/reactivate", post(reactivate_code))
            .route("/redeem", post(redeem_code))
            .route("/stats/:user_id", get(get_stats))
            .route("/usages/:user_id", get(list_usages))
            .route("/redemption/:user_id", get(get_redemption))
    }
}
