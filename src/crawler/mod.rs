use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::{
    declare::SourceKind,
    error::{FetchFailure, NormalizeError},
};

/// 請求節流
pub mod pacer;
/// 表格欄位對應
pub mod sheet;
/// 台灣證券交易所
pub mod twse;

/// 遠端回傳的內容
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
}

/// 單一來源、單一日期鍵的原始回應
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub kind: SourceKind,
    /// 日報為當天，月報為該月第一天
    pub key: NaiveDate,
    pub body: Body,
}

impl RawPayload {
    pub fn json(kind: SourceKind, key: NaiveDate, value: serde_json::Value) -> Self {
        RawPayload {
            kind,
            key,
            body: Body::Json(value),
        }
    }

    pub fn text(kind: SourceKind, key: NaiveDate, text: impl Into<String>) -> Self {
        RawPayload {
            kind,
            key,
            body: Body::Text(text.into()),
        }
    }
}

pub type FetchOutcome = Result<RawPayload, FetchFailure>;

/// 取得單一 (來源, 日期鍵, 股票代號) 的遠端資料
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, kind: SourceKind, key: NaiveDate, ticker: &str) -> FetchOutcome;
}

/// 單一來源中某一天的原始欄位，以語意名稱為鍵
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub kind: SourceKind,
    pub date: NaiveDate,
    pub values: HashMap<&'static str, String>,
}

impl RawObservation {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// 三大法人買賣超 (張)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionalFlow {
    pub date: NaiveDate,
    /// 外陸資買賣超 (不含外資自營商)
    pub foreign: i64,
    /// 投信買賣超
    pub investment_trust: i64,
    /// 自營商買賣超
    pub dealer: i64,
}

/// 收盤價與成交量 (張)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceVolume {
    pub date: NaiveDate,
    /// 當日無成交時為 None
    pub close: Option<Decimal>,
    pub volume: i64,
}

/// 千張大戶持股比率 (%)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeHolderRatio {
    pub date: NaiveDate,
    pub ratio: Decimal,
}

/// 借券賣出相關數量 (張)，無法解析的欄位保留為 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingActivity {
    pub date: NaiveDate,
    pub code: String,
    pub name: String,
    pub previous_balance: Option<i64>,
    pub sold: Option<i64>,
    pub returned: Option<i64>,
    pub adjusted: Option<i64>,
    pub balance: Option<i64>,
}

/// 各來源正規化後的資料列
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRow {
    Institutional(InstitutionalFlow),
    PriceVolume(PriceVolume),
    LargeHolder(LargeHolderRatio),
    Lending(LendingActivity),
}

impl NormalizedRow {
    pub fn date(&self) -> NaiveDate {
        match self {
            NormalizedRow::Institutional(r) => r.date,
            NormalizedRow::PriceVolume(r) => r.date,
            NormalizedRow::LargeHolder(r) => r.date,
            NormalizedRow::Lending(r) => r.date,
        }
    }
}

/// 將原始回應轉為指定股票的正規化資料列。
///
/// 回傳空集合代表該日期查無此股票；`Err` 只用於格式不符，
/// 兩者都不會中斷整批處理。
pub trait Normalize: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn parse(
        &self,
        payload: &RawPayload,
        ticker: &str,
    ) -> Result<Vec<NormalizedRow>, NormalizeError>;
}

/// 取得來源對應的解析器
pub fn normalizer_for(kind: SourceKind) -> &'static dyn Normalize {
    match kind {
        SourceKind::Institutional => &twse::institutional::InstitutionalNormalizer,
        SourceKind::PriceVolume => &twse::price::PriceVolumeNormalizer,
        SourceKind::LargeHolder => &twse::large_holder::LargeHolderNormalizer,
        SourceKind::Lending => &twse::lending::LendingNormalizer,
    }
}

/// 取出文字內容，JSON 來源不適用時回傳錯誤
pub(crate) fn expect_text(payload: &RawPayload) -> Result<&str, NormalizeError> {
    match &payload.body {
        Body::Text(text) => Ok(text),
        Body::Json(_) => Err(NormalizeError::Unreadable {
            kind: payload.kind,
            reason: "expected delimited text but got json".to_string(),
        }),
    }
}
