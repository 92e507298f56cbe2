use std::collections::HashSet;

use crate::{
    crawler::{
        expect_text,
        sheet::{FieldMatcher, FieldRule, Sheet},
        Normalize, NormalizedRow, PriceVolume, RawPayload,
    },
    declare::SourceKind,
    error::NormalizeError,
    util::{datetime, text},
};

const FIELDS: &[FieldRule] = &[
    FieldRule::required("date", FieldMatcher::Exact("日期")),
    FieldRule::required("close", FieldMatcher::Exact("收盤價")),
    FieldRule::required("volume", FieldMatcher::Exact("成交股數")),
];

/// 個股日成交資訊，一次回傳整個月份
pub struct PriceVolumeNormalizer;

impl Normalize for PriceVolumeNormalizer {
    fn kind(&self) -> SourceKind {
        SourceKind::PriceVolume
    }

    fn parse(
        &self,
        payload: &RawPayload,
        _ticker: &str,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        let body = expect_text(payload)?;

        // 第一行為標題，欄位名稱在第一個含有「日期」的行；
        // 沒有這一行時多半是「查詢無資料」之類的通知
        let Some(start) = body.lines().position(|line| line.contains("日期")) else {
            return Err(NormalizeError::Unreadable {
                kind: SourceKind::PriceVolume,
                reason: format!("no header line in {:?}", truncate(body.trim(), 40)),
            });
        };

        let table = body.lines().skip(start).collect::<Vec<_>>().join("\n");
        let sheet = Sheet::from_csv(&table).map_err(|why| NormalizeError::Unreadable {
            kind: SourceKind::PriceVolume,
            reason: why.to_string(),
        })?;
        let fields = sheet.resolve(SourceKind::PriceVolume, FIELDS)?;

        let mut seen = HashSet::with_capacity(sheet.rows.len());
        let mut result = Vec::with_capacity(sheet.rows.len());

        for row in &sheet.rows {
            // 表尾的說明文字不是日期
            let Some(raw_date) = fields.cell(row, "date").filter(|d| datetime::is_taiwan_date(d))
            else {
                continue;
            };

            let Some(date) = datetime::parse_taiwan_date(raw_date) else {
                continue;
            };

            let Some(volume) = fields
                .cell(row, "volume")
                .and_then(|v| text::parse_i64(v, None).ok())
            else {
                continue;
            };

            if !seen.insert(date) {
                continue;
            }

            // 當日無成交時收盤價為 "--"
            let close = fields
                .cell(row, "close")
                .and_then(|c| text::parse_decimal(c, None).ok());

            result.push(NormalizedRow::PriceVolume(PriceVolume {
                date,
                close,
                volume: text::to_lots(volume),
            }));
        }

        Ok(result)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    const SAMPLE: &str = "\"113年01月 2382 廣達           各日成交資訊\"\n\
\"日期\",\"成交股數\",\"成交金額\",\"開盤價\",\"最高價\",\"最低價\",\"收盤價\",\"漲跌價差\",\"成交筆數\",\n\
\"113/01/02\",\"12,345,678\",\"2,851,851,818\",\"230.00\",\"232.00\",\"228.00\",\"230.50\",\"+1.50\",\"12,345\",\n\
\"113/01/03\",\"8,000,000\",\"1,800,000,000\",\"229.00\",\"229.50\",\"224.00\",\"--\",\" 0.00\",\"9,876\",\n\
\"113/01/03\",\"1,000\",\"1\",\"1\",\"1\",\"1\",\"1\",\"1\",\"1\",\n\
\"113/01/04\",\"--\",\"0\",\"--\",\"--\",\"--\",\"--\",\" 0.00\",\"0\",\n\
\"說明:\"\n\
\"符號說明:+/-/X表示漲/跌/不比價\"\n";

    fn payload(text: &str) -> RawPayload {
        RawPayload::text(
            SourceKind::PriceVolume,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            text,
        )
    }

    #[test]
    fn test_parse_month() {
        let rows = PriceVolumeNormalizer.parse(&payload(SAMPLE), "2382").unwrap();
        assert_eq!(
            rows,
            vec![
                NormalizedRow::PriceVolume(PriceVolume {
                    date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    close: Some(dec!(230.50)),
                    volume: 12345,
                }),
                // 重複日期只保留第一筆，無收盤價時為 None
                NormalizedRow::PriceVolume(PriceVolume {
                    date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                    close: None,
                    volume: 8000,
                }),
            ]
        );
    }

    #[test]
    fn test_parse_without_header() {
        let err = PriceVolumeNormalizer
            .parse(&payload("\"查詢無資料\"\n"), "2382")
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Unreadable {
                kind: SourceKind::PriceVolume,
                ..
            }
        ));

        // 有標題行但缺欄位才是格式變動
        let err = PriceVolumeNormalizer
            .parse(&payload("\"日期\",\"收盤價\"\n"), "2382")
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::SchemaMismatch {
                kind: SourceKind::PriceVolume,
                field: "volume"
            }
        );
    }

    #[test]
    fn test_parse_missing_close_column() {
        let text = "\"日期\",\"成交股數\"\n\"113/01/02\",\"1,000\"\n";
        let err = PriceVolumeNormalizer.parse(&payload(text), "2382").unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::SchemaMismatch { field: "close", .. }
        ));
    }
}
