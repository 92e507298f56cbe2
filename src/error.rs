use thiserror::Error;

use crate::declare::SourceKind;

/// 單一請求的失敗原因，皆可略過該日期繼續處理
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed body: {0}")]
    Malformed(String),

    #[error("no data: {0}")]
    NoData(String),
}

impl FetchFailure {
    /// 只有網路層面的失敗值得重試，「查無資料」重試也不會有結果
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailure::Timeout | FetchFailure::Transport(_) => true,
            FetchFailure::Status(code) => *code == 429 || *code >= 500,
            FetchFailure::Malformed(_) | FetchFailure::NoData(_) => false,
        }
    }
}

/// 解析單一來源內容時的錯誤
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// 找不到必要欄位，通常代表證交所改了格式
    #[error("{kind} payload has no column for '{field}'")]
    SchemaMismatch { kind: SourceKind, field: &'static str },

    #[error("{kind} payload is not usable: {reason}")]
    Unreadable { kind: SourceKind, reason: String },
}

/// 整段期間皆無可用資料的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmptyReason {
    #[error("no data returned from {kind} for the requested range")]
    NoData { kind: SourceKind },

    #[error("no overlapping dates across institutional and price sources")]
    NoOverlap,
}

/// 跨出資料整合流程邊界的錯誤
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no data: {0}")]
    Empty(#[from] EmptyReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(FetchFailure::Timeout.is_retryable());
        assert!(FetchFailure::Status(503).is_retryable());
        assert!(FetchFailure::Status(429).is_retryable());
        assert!(!FetchFailure::Status(404).is_retryable());
        assert!(!FetchFailure::NoData("很抱歉，沒有符合條件的資料!".to_string()).is_retryable());
    }

    #[test]
    fn test_empty_messages_are_distinct() {
        let no_data = FusionError::from(EmptyReason::NoData {
            kind: SourceKind::Institutional,
        });
        let no_overlap = FusionError::from(EmptyReason::NoOverlap);
        assert_eq!(
            no_data.to_string(),
            "no data: no data returned from institutional for the requested range"
        );
        assert_ne!(no_data.to_string(), no_overlap.to_string());
    }
}
