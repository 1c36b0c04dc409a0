use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 5;
/// 姓名中没有ASCII字母数字时使用的首字母
const FALLBACK_INITIAL: char = 'R';

/// 推荐码候选生成器
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, owner_name: &str, now: DateTime<Utc>) -> String;
}

/// 首字母 + base36(毫秒时间戳) + 5位随机base36，整体大写
#[derive(Debug, Clone, Default)]
pub struct DefaultCodeGenerator;

impl CodeGenerator for DefaultCodeGenerator {
    fn generate(&self, owner_name: &str, now: DateTime<Utc>) -> String {
        let initial = owner_initial(owner_name);
        let timestamp = to_base36(now.timestamp_millis().max(0) as u64);

        let mut rng = rand::thread_rng();
        let suffix: String = (0..RANDOM_SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();

        format!("{}{}{}", initial, timestamp, suffix).to_uppercase()
    }
}

fn owner_initial(owner_name: &str) -> char {
    owner_name
        .chars()
        .find(|c| c.is_ascii_alphanumeric())
        .unwrap_or(FALLBACK_INITIAL)
        .to_ascii_uppercase()
}

pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();

    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn test_generated_code_shape() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let code = DefaultCodeGenerator.generate("hong gildong", now);

        assert!(code.starts_with("HLOYW3V28"));
        assert_eq!(code.len(), 1 + 8 + RANDOM_SUFFIX_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_non_ascii_name_uses_fallback_initial() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert!(DefaultCodeGenerator.generate("홍길동", now).starts_with('R'));
        assert!(DefaultCodeGenerator.generate("", now).starts_with('R'));
        assert!(DefaultCodeGenerator.generate("김 Kim", now).starts_with('K'));
    }
}
