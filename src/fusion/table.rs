use std::collections::{btree_map::Entry, BTreeMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::declare::SourceKind;

/// 單一來源依日期排序的資料，同一天重複出現時保留第一筆
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable<T> {
    rows: BTreeMap<NaiveDate, T>,
}

impl<T> Default for SourceTable<T> {
    fn default() -> Self {
        SourceTable {
            rows: BTreeMap::new(),
        }
    }
}

impl<T> SourceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 回傳是否有寫入，已存在的日期不會被覆蓋
    pub fn insert(&mut self, date: NaiveDate, row: T) -> bool {
        match self.rows.entry(date) {
            Entry::Vacant(entry) => {
                entry.insert(row);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&T> {
        self.rows.get(date)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 由舊到新
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &T)> {
        self.rows.iter()
    }
}

/// 各來源抓取與解析的統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// 請求的日期鍵數
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub schema_mismatches: usize,
    /// 收進資料表的列數
    pub rows: usize,
}

/// 對齊後的一天
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedRow {
    pub date: NaiveDate,
    pub foreign: i64,
    pub investment_trust: i64,
    pub dealer: i64,
    pub close: Option<Decimal>,
    pub volume: i64,
    pub lending_sold: Option<i64>,
    pub lending_returned: Option<i64>,
    pub lending_adjusted: Option<i64>,
    pub lending_balance: Option<i64>,
    pub large_holder_ratio: Option<Decimal>,
}

/// 整合完成的結果，建立後不再變動
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    pub ticker: String,
    pub lookback_days: usize,
    /// 依日期由舊到新，日期不重複
    pub rows: Vec<AlignedRow>,
    pub stats: BTreeMap<SourceKind, SourceStats>,
}

impl AlignedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn stats_for(&self, kind: SourceKind) -> SourceStats {
        self.stats.get(&kind).copied().unwrap_or_default()
    }
}
