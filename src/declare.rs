use chrono::NaiveDate;
use strum::{Display, EnumIter};

use crate::util::datetime;

/// 資料來源的發布粒度
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Granularity {
    /// 一次請求取得單一日期
    Daily,
    /// 一次請求取得整個月份
    Monthly,
}

/// 證交所的資料來源
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum SourceKind {
    /// 三大法人買賣超日報 (T86)
    #[strum(serialize = "institutional")]
    Institutional,
    /// 個股日成交資訊 (STOCK_DAY)
    #[strum(serialize = "price_volume")]
    PriceVolume,
    /// 千張大戶持股比率 (BWIBBU_d)
    #[strum(serialize = "large_holder")]
    LargeHolder,
    /// 融券借券賣出餘額 (TWT93U)
    #[strum(serialize = "lending")]
    Lending,
}

impl SourceKind {
    pub fn granularity(&self) -> Granularity {
        match self {
            SourceKind::PriceVolume => Granularity::Monthly,
            SourceKind::Institutional | SourceKind::LargeHolder | SourceKind::Lending => {
                Granularity::Daily
            }
        }
    }

    /// 主要來源以 inner join 合併，其餘以 left join 補值
    pub fn is_primary(&self) -> bool {
        matches!(self, SourceKind::Institutional | SourceKind::PriceVolume)
    }

    /// 回傳抓取指定日期資料時所使用的日期鍵
    pub fn key_for(&self, date: NaiveDate) -> NaiveDate {
        match self.granularity() {
            Granularity::Daily => date,
            Granularity::Monthly => datetime::first_day_of_month(date),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_key_for() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        assert_eq!(SourceKind::Institutional.key_for(d), d);
        assert_eq!(
            SourceKind::PriceVolume.key_for(d),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_primary_sources() {
        let primaries: Vec<SourceKind> = SourceKind::iter().filter(|k| k.is_primary()).collect();
        assert_eq!(
            primaries,
            vec![SourceKind::Institutional, SourceKind::PriceVolume]
        );
        assert_eq!(SourceKind::LargeHolder.to_string(), "large_holder");
    }
}
