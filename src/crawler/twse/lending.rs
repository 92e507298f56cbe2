use crate::{
    crawler::{expect_text, sheet::Sheet, LendingActivity, Normalize, NormalizedRow, RawPayload},
    declare::SourceKind,
    error::NormalizeError,
    util::text,
};

/// TWT93U 的欄位順序固定，第二行為群組標題 (融券、借券賣出)，第三行才是子欄位
const COLUMNS: usize = 15;
const CODE: usize = 0;
const NAME: usize = 1;
const LENDING_PREVIOUS_BALANCE: usize = 8;
const LENDING_SOLD: usize = 9;
const LENDING_RETURNED: usize = 10;
const LENDING_ADJUSTED: usize = 11;
const LENDING_BALANCE: usize = 12;

/// 融券借券賣出餘額
pub struct LendingNormalizer;

impl Normalize for LendingNormalizer {
    fn kind(&self) -> SourceKind {
        SourceKind::Lending
    }

    fn parse(
        &self,
        payload: &RawPayload,
        ticker: &str,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        let body = expect_text(payload)?;
        let table = body.lines().skip(1).collect::<Vec<_>>().join("\n");
        let sheet = Sheet::from_csv(&table).map_err(|why| NormalizeError::Unreadable {
            kind: SourceKind::Lending,
            reason: why.to_string(),
        })?;

        if sheet.headers.len() <= LENDING_BALANCE {
            return Err(NormalizeError::SchemaMismatch {
                kind: SourceKind::Lending,
                field: "lending_balance",
            });
        }

        // 子欄位名稱那一行不是資料
        let Some(row) = sheet.rows.iter().skip(1).find(|row| {
            row.get(CODE)
                .and_then(|c| text::first_digit_run(c))
                .is_some_and(|code| code == ticker)
        }) else {
            return Ok(Vec::new());
        };

        let row = &row[..row.len().min(COLUMNS)];
        let lots = |index: usize| {
            row.get(index)
                .and_then(|cell| text::parse_i64(cell, None).ok())
                .map(text::to_lots)
        };

        Ok(vec![NormalizedRow::Lending(LendingActivity {
            date: payload.key,
            code: ticker.to_string(),
            name: row.get(NAME).map(|n| n.trim().to_string()).unwrap_or_default(),
            previous_balance: lots(LENDING_PREVIOUS_BALANCE),
            sold: lots(LENDING_SOLD),
            returned: lots(LENDING_RETURNED),
            adjusted: lots(LENDING_ADJUSTED),
            balance: lots(LENDING_BALANCE),
        })])
    }
}
