use crate::{
    crawler::{
        expect_text,
        sheet::{FieldMatcher, FieldRule, Sheet},
        LargeHolderRatio, Normalize, NormalizedRow, RawPayload,
    },
    declare::SourceKind,
    error::NormalizeError,
    util::text,
};

const FIELDS: &[FieldRule] = &[
    FieldRule::required("code", FieldMatcher::Exact("證券代號")),
    FieldRule::required("ratio", FieldMatcher::ContainsAll(&["千張", "比"])),
];

/// 千張大戶持股比率
pub struct LargeHolderNormalizer;

impl Normalize for LargeHolderNormalizer {
    fn kind(&self) -> SourceKind {
        SourceKind::LargeHolder
    }

    fn parse(
        &self,
        payload: &RawPayload,
        ticker: &str,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        let body = expect_text(payload)?;

        // 第一行為報表標題
        let table = body.lines().skip(1).collect::<Vec<_>>().join("\n");
        let sheet = Sheet::from_csv(&table).map_err(|why| NormalizeError::Unreadable {
            kind: SourceKind::LargeHolder,
            reason: why.to_string(),
        })?;
        let fields = sheet.resolve(SourceKind::LargeHolder, FIELDS)?;
        let Some(code) = fields.index_of("code") else {
            return Ok(Vec::new());
        };

        let Some(row) = sheet.first_row_where(code, |c| c.trim() == ticker) else {
            return Ok(Vec::new());
        };

        let ratio = fields
            .cell(row, "ratio")
            .and_then(|r| text::parse_decimal(r, None).ok());

        Ok(ratio
            .map(|ratio| {
                NormalizedRow::LargeHolder(LargeHolderRatio {
                    date: payload.key,
                    ratio,
                })
            })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    const SAMPLE: &str = "\"113年01月02日 個股日本益比、殖利率及股價淨值比\"\n\
\"證券代號\",\"證券名稱\",\"殖利率(%)\",\"本益比\",\"千張大戶持股比率(%)\",\n\
\"2330\",\"台積電\",\"1.90\",\"15.20\",\"87.01\",\n\
\n\
\"2382 \",\"廣達\",\"2.50\",\"25.00\",\"55.12%\",\n\
\"2382\",\"廣達\",\"2.50\",\"25.00\",\"11.11\",\n\
\"2603\",\"長榮\",\"8.00\",\"3.00\",\"-\",\n";

    fn payload(text: &str) -> RawPayload {
        RawPayload::text(
            SourceKind::LargeHolder,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            text,
        )
    }

    #[test]
    fn test_parse() {
        let rows = LargeHolderNormalizer.parse(&payload(SAMPLE), "2382").unwrap();
        assert_eq!(
            rows,
            vec![NormalizedRow::LargeHolder(LargeHolderRatio {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                ratio: dec!(55.12),
            })]
        );
    }

    #[test]
    fn test_parse_missing_values() {
        assert!(LargeHolderNormalizer
            .parse(&payload(SAMPLE), "2603")
            .unwrap()
            .is_empty());
        assert!(LargeHolderNormalizer
            .parse(&payload(SAMPLE), "9999")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_schema_mismatch() {
        let text = "\"title\"\n\"證券代號\",\"殖利率(%)\"\n\"2382\",\"2.50\"\n";
        assert_eq!(
            LargeHolderNormalizer.parse(&payload(text), "2382"),
            Err(NormalizeError::SchemaMismatch {
                kind: SourceKind::LargeHolder,
                field: "ratio"
            })
        );
    }
}
