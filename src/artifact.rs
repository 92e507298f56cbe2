//! 輸出整合結果，圖表繪製由外部工具讀取這裡產生的 CSV。

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use concat_string::concat_string;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    fusion::AlignedTable,
    util::{datetime, text::SHARES_PER_LOT},
};

/// 法人與股價走勢的輸出用途
pub const INSTITUTIONS_AND_PRICE: &str = "institutions_and_price";

/// 單一法人買賣超超過此張數視為大額交易
pub const LARGE_TRADE_LOTS: i64 = 400;

/// `{ticker}_{purpose}_{yyyymmdd}.{ext}`
pub fn file_name(ticker: &str, purpose: &str, date: NaiveDate, ext: &str) -> String {
    concat_string!(ticker, "_", purpose, "_", datetime::compact(date), ".", ext)
}

/// 將整合結果寫成 CSV，回傳檔案路徑
pub fn write_csv(
    table: &AlignedTable,
    output_dir: impl Into<PathBuf>,
    purpose: &str,
    today: NaiveDate,
) -> Result<PathBuf> {
    let output_dir = output_dir.into();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let path = output_dir.join(file_name(&table.ticker, purpose, today, "csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    for row in &table.rows {
        writer.serialize(row)?;
    }

    // 沒有資料列時 serialize 不會寫出欄位名稱
    if table.rows.is_empty() {
        writer.write_record(HEADERS)?;
    }

    writer.flush()?;

    Ok(path)
}

const HEADERS: &[&str] = &[
    "date",
    "foreign",
    "investment_trust",
    "dealer",
    "close",
    "volume",
    "lending_sold",
    "lending_returned",
    "lending_adjusted",
    "lending_balance",
    "large_holder_ratio",
];

/// 任一類法人買賣超絕對值超過門檻的日期
pub fn large_trade_days(table: &AlignedTable, threshold_lots: i64) -> Vec<NaiveDate> {
    table
        .rows
        .iter()
        .filter(|r| {
            [r.foreign, r.investment_trust, r.dealer]
                .iter()
                .any(|net| net.abs() > threshold_lots)
        })
        .map(|r| r.date)
        .collect()
}

/// 每日成交張數佔流通張數的百分比，取到小數第二位
pub fn turnover_rates(table: &AlignedTable, float_shares: i64) -> Vec<(NaiveDate, Option<Decimal>)> {
    let float_lots = Decimal::from(float_shares) / Decimal::from(SHARES_PER_LOT);

    table
        .rows
        .iter()
        .map(|r| {
            let rate = (!float_lots.is_zero()).then(|| {
                (Decimal::from(r.volume) / float_lots * Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
            });
            (r.date, rate)
        })
        .collect()
}
