//! 依交易日整合多個來源。
//!
//! 流程：
//! 1. 由交易日曆取得候選日期
//! 2. 依來源的粒度 (日報或月報) 逐一抓取並解析，失敗的日期略過
//! 3. 每個來源建立一張依日期排序的資料表
//! 4. 主要來源取交集，補充來源以左側為主合併並補值

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use crate::{
    calendar::{self, TradingDate},
    config::Pipeline,
    crawler::{normalizer_for, Fetch, FetchOutcome, NormalizedRow},
    declare::{Granularity, SourceKind},
    error::{EmptyReason, FusionError, NormalizeError},
    logging,
};

pub mod merge;
pub mod table;

pub use table::{AlignedRow, AlignedTable, SourceStats, SourceTable};

/// 是否合併補充來源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignOptions {
    pub include_lending: bool,
    pub include_large_holder: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        AlignOptions {
            include_lending: true,
            include_large_holder: true,
        }
    }
}

impl From<&Pipeline> for AlignOptions {
    fn from(pipeline: &Pipeline) -> Self {
        AlignOptions {
            include_lending: pipeline.include_lending,
            include_large_holder: pipeline.include_large_holder,
        }
    }
}

/// 單一來源收集到的資料列
struct Collected {
    rows: Vec<NormalizedRow>,
    stats: SourceStats,
}

pub struct DataAligner<F> {
    fetcher: F,
    options: AlignOptions,
    anchor: Option<NaiveDate>,
}

impl<F: Fetch> DataAligner<F> {
    pub fn new(fetcher: F, options: AlignOptions) -> Self {
        DataAligner {
            fetcher,
            options,
            anchor: None,
        }
    }

    /// 以指定日期取代今天作為回溯的起點
    pub fn anchored_at(mut self, anchor: NaiveDate) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// 取得 `ticker` 最近 `lookback_days` 個交易日的整合資料。
    ///
    /// 法人買賣超沒有任何資料時不會再請求其他來源。
    pub async fn align(
        &self,
        ticker: &str,
        lookback_days: usize,
    ) -> Result<AlignedTable, FusionError> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(FusionError::Configuration(
                "ticker is required".to_string(),
            ));
        }

        let days = match self.anchor {
            Some(anchor) => calendar::recent_trading_days_from(anchor, lookback_days),
            None => calendar::recent_trading_days(lookback_days),
        };
        let candidates: BTreeSet<NaiveDate> = days.iter().map(TradingDate::date).collect();
        let mut stats = BTreeMap::new();

        let collected = self
            .collect(SourceKind::Institutional, keys_for(SourceKind::Institutional, &days), ticker)
            .await;
        let institutional = build_table(&collected.rows, &candidates, |row| match row {
            NormalizedRow::Institutional(r) => Some(r.clone()),
            _ => None,
        });
        record(&mut stats, SourceKind::Institutional, collected.stats, institutional.len());
        require_rows(SourceKind::Institutional, institutional.len())?;

        let collected = self
            .collect(SourceKind::PriceVolume, keys_for(SourceKind::PriceVolume, &days), ticker)
            .await;
        let prices = build_table(&collected.rows, &candidates, |row| match row {
            NormalizedRow::PriceVolume(r) => Some(r.clone()),
            _ => None,
        });
        record(&mut stats, SourceKind::PriceVolume, collected.stats, prices.len());
        require_rows(SourceKind::PriceVolume, prices.len())?;

        let mut rows = merge::inner_join(&institutional, &prices);
        if rows.is_empty() {
            return Err(EmptyReason::NoOverlap.into());
        }

        // 補充來源只需要交集後留下的日期
        let joined: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();

        if self.options.include_lending {
            let collected = self
                .collect(SourceKind::Lending, joined.clone(), ticker)
                .await;
            let lending = build_table(&collected.rows, &candidates, |row| match row {
                NormalizedRow::Lending(r) => Some(r.clone()),
                _ => None,
            });
            record(&mut stats, SourceKind::Lending, collected.stats, lending.len());
            merge::attach_lending(&mut rows, &lending);
        }

        if self.options.include_large_holder {
            let collected = self
                .collect(SourceKind::LargeHolder, joined, ticker)
                .await;
            let ratios = build_table(&collected.rows, &candidates, |row| match row {
                NormalizedRow::LargeHolder(r) => Some(r.clone()),
                _ => None,
            });
            record(&mut stats, SourceKind::LargeHolder, collected.stats, ratios.len());
            merge::attach_large_holder(&mut rows, &ratios);
        }

        logging::info_file_async(format!(
            "{} aligned {} rows over {} candidate days",
            ticker,
            rows.len(),
            days.len()
        ));

        Ok(AlignedTable {
            ticker: ticker.to_string(),
            lookback_days,
            rows,
            stats,
        })
    }

    /// 依時間順序逐一抓取並解析，單一日期鍵的失敗只記錄不中斷
    async fn collect(&self, kind: SourceKind, keys: Vec<NaiveDate>, ticker: &str) -> Collected {
        let outcomes: Vec<(NaiveDate, FetchOutcome)> = stream::iter(keys)
            .then(|key| async move { (key, self.fetcher.fetch(kind, key, ticker).await) })
            .collect()
            .await;

        let normalizer = normalizer_for(kind);
        outcomes.into_iter().fold(
            Collected {
                rows: Vec::new(),
                stats: SourceStats::default(),
            },
            |mut acc, (key, outcome)| {
                acc.stats.attempted += 1;

                let payload = match outcome {
                    Ok(payload) => payload,
                    Err(why) => {
                        acc.stats.failed += 1;
                        logging::warn_file_async(format!(
                            "Skip {} {} for {} because {}",
                            kind, key, ticker, why
                        ));
                        return acc;
                    }
                };

                match normalizer.parse(&payload, ticker) {
                    Ok(rows) => {
                        acc.stats.succeeded += 1;
                        acc.rows.extend(rows);
                    }
                    Err(why @ NormalizeError::SchemaMismatch { .. }) => {
                        acc.stats.schema_mismatches += 1;
                        logging::error_file_async(format!(
                            "Skip {} {} for {} because {}",
                            kind, key, ticker, why
                        ));
                    }
                    Err(why) => {
                        acc.stats.failed += 1;
                        logging::warn_file_async(format!(
                            "Skip {} {} for {} because {}",
                            kind, key, ticker, why
                        ));
                    }
                }

                acc
            },
        )
    }
}

/// 日報每天一個鍵，月報每個月份一個鍵
fn keys_for(kind: SourceKind, days: &[TradingDate]) -> Vec<NaiveDate> {
    match kind.granularity() {
        Granularity::Daily => days.iter().map(TradingDate::date).collect(),
        Granularity::Monthly => calendar::months_covering(days),
    }
}

/// 只收候選日期內的資料列，同一天重複時保留第一筆
fn build_table<T, P>(
    rows: &[NormalizedRow],
    candidates: &BTreeSet<NaiveDate>,
    pick: P,
) -> SourceTable<T>
where
    P: Fn(&NormalizedRow) -> Option<T>,
{
    let mut table = SourceTable::new();
    for row in rows {
        if !candidates.contains(&row.date()) {
            continue;
        }

        if let Some(value) = pick(row) {
            table.insert(row.date(), value);
        }
    }

    table
}

/// 主要來源沒有任何資料時整段期間都無法對齊
fn require_rows(kind: SourceKind, rows: usize) -> Result<(), FusionError> {
    if kind.is_primary() && rows == 0 {
        return Err(EmptyReason::NoData { kind }.into());
    }

    Ok(())
}

fn record(
    stats: &mut BTreeMap<SourceKind, SourceStats>,
    kind: SourceKind,
    mut source: SourceStats,
    rows: usize,
) {
    source.rows = rows;
    logging::info_file_async(format!("{} {:?}", kind, source));
    stats.insert(kind, source);
}
