use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    crawler::{
        sheet::{FieldMatcher, FieldRule, Sheet},
        Body, InstitutionalFlow, Normalize, NormalizedRow, RawObservation, RawPayload,
    },
    declare::SourceKind,
    error::NormalizeError,
    util::text,
};

/// T86 回傳的 JSON，只取用需要的欄位
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
struct T86Response {
    pub stat: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

const FIELDS: &[FieldRule] = &[
    FieldRule::required("code", FieldMatcher::Exact("證券代號")),
    FieldRule::required(
        "foreign",
        FieldMatcher::Exact("外陸資買賣超股數(不含外資自營商)"),
    ),
    FieldRule::required("investment_trust", FieldMatcher::Exact("投信買賣超股數")),
    FieldRule::required("dealer", FieldMatcher::Exact("自營商買賣超股數")),
];

/// 三大法人買賣超日報
pub struct InstitutionalNormalizer;

impl Normalize for InstitutionalNormalizer {
    fn kind(&self) -> SourceKind {
        SourceKind::Institutional
    }

    fn parse(
        &self,
        payload: &RawPayload,
        ticker: &str,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        let sheet = to_sheet(payload)?;
        let fields = sheet.resolve(SourceKind::Institutional, FIELDS)?;
        let Some(code) = fields.index_of("code") else {
            return Ok(Vec::new());
        };

        let Some(row) = sheet.first_row_where(code, |c| text::strip_security_code(c) == ticker)
        else {
            return Ok(Vec::new());
        };

        let observation = fields.observe(SourceKind::Institutional, payload.key, row);
        Ok(vec![NormalizedRow::Institutional(to_flow(&observation)?)])
    }
}

fn to_sheet(payload: &RawPayload) -> Result<Sheet, NormalizeError> {
    let Body::Json(value) = &payload.body else {
        return Err(NormalizeError::Unreadable {
            kind: SourceKind::Institutional,
            reason: "expected json".to_string(),
        });
    };

    let res = T86Response::deserialize(value).map_err(|why| NormalizeError::Unreadable {
        kind: SourceKind::Institutional,
        reason: why.to_string(),
    })?;

    let rows = res
        .data
        .iter()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok(Sheet::new(res.fields, rows))
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_flow(observation: &RawObservation) -> Result<InstitutionalFlow, NormalizeError> {
    let lots = |name: &'static str| -> Result<i64, NormalizeError> {
        let raw = observation.get(name).unwrap_or_default();
        text::parse_i64(raw, None)
            .map(text::to_lots)
            .map_err(|why| NormalizeError::Unreadable {
                kind: SourceKind::Institutional,
                reason: format!("{} {}", name, why),
            })
    };

    Ok(InstitutionalFlow {
        date: observation.date,
        foreign: lots("foreign")?,
        investment_trust: lots("investment_trust")?,
        dealer: lots("dealer")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> RawPayload {
        RawPayload::json(
            SourceKind::Institutional,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            value,
        )
    }

    fn sample() -> Value {
        json!({
            "stat": "OK",
            "date": "20240102",
            "fields": [
                "證券代號", "證券名稱",
                "外陸資買進股數(不含外資自營商)",
                "外陸資買賣超股數(不含外資自營商)",
                "投信買賣超股數",
                "自營商買賣超股數(自行買賣)",
                "自營商買賣超股數"
            ],
            "data": [
                ["2330", "台積電", "10,000,000", "1,234,000", "0", "5,000", "-3,000"],
                ["=\"2382\"", "廣達", "2,000,000", "1,000,000", "-12,345,000", "0", "500"],
                ["2382", "廣達", "0", "9,000,000", "0", "0", "0"]
            ]
        })
    }

    #[test]
    fn test_parse() {
        let rows = InstitutionalNormalizer
            .parse(&payload(sample()), "2382")
            .unwrap();

        // 重複的代號只取第一筆
        assert_eq!(
            rows,
            vec![NormalizedRow::Institutional(InstitutionalFlow {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                foreign: 1000,
                investment_trust: -12345,
                dealer: 0,
            })]
        );
    }

    #[test]
    fn test_parse_negative_shares_floor() {
        let rows = InstitutionalNormalizer
            .parse(&payload(sample()), "2330")
            .unwrap();
        let NormalizedRow::Institutional(flow) = &rows[0] else {
            panic!("unexpected row {:?}", rows[0]);
        };
        assert_eq!(flow.foreign, 1234);
        assert_eq!(flow.dealer, -3);
    }

    #[test]
    fn test_parse_ticker_absent() {
        let rows = InstitutionalNormalizer
            .parse(&payload(sample()), "9999")
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_schema_mismatch() {
        let value = json!({
            "stat": "OK",
            "fields": ["證券代號", "外資買賣超股數"],
            "data": [["2382", "1,000"]]
        });
        let err = InstitutionalNormalizer
            .parse(&payload(value), "2382")
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::SchemaMismatch {
                kind: SourceKind::Institutional,
                field: "foreign"
            }
        );
    }

    #[test]
    fn test_parse_text_body() {
        let p = RawPayload::text(
            SourceKind::Institutional,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            "a,b",
        );
        assert!(matches!(
            InstitutionalNormalizer.parse(&p, "2382"),
            Err(NormalizeError::Unreadable { .. })
        ));
    }
}
