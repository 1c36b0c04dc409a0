use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::referral_model::RewardStatus;
use serde_json::json;
use thiserror::Error;
use utils::AppError;

pub type ReferralResult<T> = Result<T, ReferralError>;

/// 推荐账本错误类型
///
/// 每种校验失败都是独立的变体，调用方据此展示具体提示
#[derive(Error, Debug)]
pub enum ReferralError {
    #[error("유효하지 않은 추천 코드입니다")]
    InvalidCode,

    #[error("본인의 추천 코드는 사용할 수 없습니다")]
    SelfReferralForbidden,

    #[error("이미 추천 코드를 사용한 사용자입니다")]
    AlreadyRedeemed,

    #[error("추천 코드 사용 한도를 초과했습니다")]
    UsageLimitExceeded,

    #[error("만료된 추천 코드입니다")]
    CodeExpired,

    #[error("고유한 추천 코드를 생성할 수 없습니다 ({0}회 시도)")]
    CodeGenerationExhausted(u32),

    #[error("추천 코드를 찾을 수 없습니다: {0}")]
    CodeNotFound(String),

    #[error("사용자 {0}에게 이미 활성 추천 코드가 있습니다")]
    ActiveCodeExists(String),

    #[error("보상을 찾을 수 없습니다: {0}")]
    RewardNotFound(String),

    #[error("보상 상태가 올바르지 않습니다: expected {expected}, actual {actual}")]
    InvalidRewardState { expected: RewardStatus, actual: RewardStatus },

    #[error("보상 금액은 0보다 커야 합니다: {0}")]
    InvalidAmount(i64),

    #[error("저장소를 사용할 수 없습니다: {0}")]
    StoreUnavailable(String),
}

impl From<AppError> for ReferralError {
    fn from(err: AppError) -> Self {
        ReferralError::StoreUnavailable(err.to_string())
    }
}

impl ReferralError {
    pub fn code(&self) -> &'static str {
        match self {
            ReferralError::InvalidCode => "INVALID_CODE",
            ReferralError::SelfReferralForbidden => "SELF_REFERRAL_FORBIDDEN",
            ReferralError::AlreadyRedeemed => "ALREADY_REDEEMED",
            ReferralError::UsageLimitExceeded => "USAGE_LIMIT_EXCEEDED",
            ReferralError::CodeExpired => "CODE_EXPIRED",
            ReferralError::CodeGenerationExhausted(_) => "CODE_GENERATION_EXHAUSTED",
            ReferralError::CodeNotFound(_) => "CODE_NOT_FOUND",
            ReferralError::ActiveCodeExists(_) => "ACTIVE_CODE_EXISTS",
            ReferralError::RewardNotFound(_) => "REWARD_NOT_FOUND",
            ReferralError::InvalidRewardState { .. } => "INVALID_REWARD_STATE",
            ReferralError::InvalidAmount(_) => "INVALID_AMOUNT",
            ReferralError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ReferralError::InvalidCode | ReferralError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            ReferralError::CodeNotFound(_) | ReferralError::RewardNotFound(_) => StatusCode::NOT_FOUND,
            ReferralError::AlreadyRedeemed
            | ReferralError::ActiveCodeExists(_)
            | ReferralError::InvalidRewardState { .. } => StatusCode::CONFLICT,
            ReferralError::SelfReferralForbidden | ReferralError::UsageLimitExceeded | ReferralError::CodeExpired => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ReferralError::CodeGenerationExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ReferralError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ReferralError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("❌ 推荐账本错误: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            },
            "success": false
        }));

        (status, body).into_response()
    }
}
