//! 交易日曆。
//!
//! 只以週一至週五判斷是否可能為交易日，不處理國定假日；
//! 假日當天證交所會回覆查無資料，合併時自然被排除。

use std::{collections::BTreeSet, fmt};

use chrono::{Local, NaiveDate};

use crate::util::datetime::{self, Weekend};

/// 候選交易日
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradingDate(NaiveDate);

impl TradingDate {
    pub fn new(date: NaiveDate) -> Self {
        TradingDate(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// 週一至週五視為候選交易日
    pub fn is_trading_candidate(&self) -> bool {
        !self.0.is_weekend()
    }
}

impl fmt::Display for TradingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl From<TradingDate> for NaiveDate {
    fn from(value: TradingDate) -> Self {
        value.0
    }
}

/// 從今天往回取最近 `n` 個候選交易日，由舊到新排列
pub fn recent_trading_days(n: usize) -> Vec<TradingDate> {
    recent_trading_days_from(Local::now().date_naive(), n)
}

/// 從 `anchor` (含) 往回取最近 `n` 個候選交易日，由舊到新排列
pub fn recent_trading_days_from(anchor: NaiveDate, n: usize) -> Vec<TradingDate> {
    // n 可能遠大於日曆能表示的天數，不預先配置
    let mut days = Vec::new();
    let mut cursor = Some(anchor);

    while days.len() < n {
        let Some(date) = cursor else {
            break;
        };

        let day = TradingDate::new(date);
        if day.is_trading_candidate() {
            days.push(day);
        }

        cursor = date.pred_opt();
    }

    days.reverse();
    days
}

/// 涵蓋這些日期所需的月份 (每月第一天)，由舊到新排列且不重複
pub fn months_covering(dates: &[TradingDate]) -> Vec<NaiveDate> {
    dates
        .iter()
        .map(|d| datetime::first_day_of_month(d.date()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_zero_days() {
        assert!(recent_trading_days_from(ymd(2024, 1, 3), 0).is_empty());
        assert!(recent_trading_days(0).is_empty());
    }

    #[test]
    fn test_recent_trading_days_properties() {
        let start = ymd(2023, 12, 25);
        for offset in 0..14 {
            let anchor = start + Duration::days(offset);
            for n in 0..40 {
                let days = recent_trading_days_from(anchor, n);
                assert_eq!(days.len(), n);
                assert!(days.iter().all(|d| d.is_trading_candidate()));
                assert!(days.windows(2).all(|w| w[0] < w[1]));
                assert!(days.iter().all(|d| d.date() <= anchor));
            }
        }
    }

    #[test]
    fn test_skips_weekend() {
        // 2024-01-08 為週一，往回兩天應跳過週末
        let days = recent_trading_days_from(ymd(2024, 1, 8), 2);
        assert_eq!(
            days,
            vec![TradingDate::new(ymd(2024, 1, 5)), TradingDate::new(ymd(2024, 1, 8))]
        );

        // 週六為起點時不包含當天
        let days = recent_trading_days_from(ymd(2024, 1, 6), 1);
        assert_eq!(days, vec![TradingDate::new(ymd(2024, 1, 5))]);
    }

    #[test]
    fn test_lookback_beyond_calendar_range() {
        let anchor = NaiveDate::MIN + Duration::days(20);
        let days = recent_trading_days_from(anchor, usize::MAX);
        assert!(!days.is_empty());
        assert!(days.len() <= 21);
        assert!(days.iter().all(|d| d.is_trading_candidate()));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_today_based() {
        let days = recent_trading_days(5);
        assert_eq!(days.len(), 5);
        assert!(days.last().unwrap().date() <= Local::now().date_naive());
    }

    #[test]
    fn test_months_covering() {
        let days = recent_trading_days_from(ymd(2024, 2, 2), 5);
        assert_eq!(months_covering(&days), vec![ymd(2024, 1, 1), ymd(2024, 2, 1)]);
        assert!(months_covering(&[]).is_empty());
        assert_eq!(TradingDate::new(ymd(2024, 1, 2)).to_string(), "2024-01-02");
    }
}
