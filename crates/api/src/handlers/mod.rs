pub mod assignment;
pub mod audit;
pub mod health;
pub mod optimization;
pub mod swaps;
pub mod workers;

use std::str::FromStr;

use crate::error::ApiError;

/// 解析可选的查询参数，空字符串视为未提供
pub(crate) fn parse_optional<T>(raw: Option<&str>, field: &str) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("{field}: {e}"))),
        None => Ok(None),
    }
}
