pub mod referral_dto;
pub mod reward_dto;

use validator::ValidationError;

/// 用户ID等字段不能只包含空白
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
