//! 證交所報表的欄位順序與名稱會隨改版變動，
//! 各來源以 (語意名稱, 比對規則) 宣告需要的欄位，每份報表解析一次欄位位置。

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::{crawler::RawObservation, declare::SourceKind, error::NormalizeError};

/// 欄位名稱的比對規則
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatcher {
    Exact(&'static str),
    Contains(&'static str),
    /// 必須同時包含所有片段
    ContainsAll(&'static [&'static str]),
}

impl FieldMatcher {
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim();
        match self {
            FieldMatcher::Exact(name) => header == *name,
            FieldMatcher::Contains(part) => header.contains(part),
            FieldMatcher::ContainsAll(parts) => parts.iter().all(|p| header.contains(p)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub matcher: FieldMatcher,
    pub required: bool,
}

impl FieldRule {
    pub const fn required(name: &'static str, matcher: FieldMatcher) -> Self {
        FieldRule {
            name,
            matcher,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, matcher: FieldMatcher) -> Self {
        FieldRule {
            name,
            matcher,
            required: false,
        }
    }
}

/// 欄位名稱與資料列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Sheet { headers, rows }
    }

    /// 解析 CSV 文字，第一列為欄位名稱，全空白的列與無法解析的列會被略過
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut records = reader.records();

        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(clean_header).collect(),
            None => return Err(anyhow!("csv has no header line")),
        };

        let mut rows = Vec::with_capacity(64);
        for record in records {
            let Ok(record) = record else {
                continue;
            };

            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Sheet { headers, rows })
    }

    /// 依宣告找出各欄位的位置，必要欄位找不到時回傳 SchemaMismatch
    pub fn resolve(
        &self,
        kind: SourceKind,
        rules: &[FieldRule],
    ) -> Result<ResolvedFields, NormalizeError> {
        let mut columns = Vec::with_capacity(rules.len());

        for rule in rules {
            let index = self.headers.iter().position(|h| rule.matcher.matches(h));
            if index.is_none() && rule.required {
                return Err(NormalizeError::SchemaMismatch {
                    kind,
                    field: rule.name,
                });
            }
            columns.push((rule.name, index));
        }

        Ok(ResolvedFields { columns })
    }

    /// 第一筆符合條件的資料列，重複出現的列一律忽略
    pub fn first_row_where<F>(&self, column: usize, mut predicate: F) -> Option<&[String]>
    where
        F: FnMut(&str) -> bool,
    {
        self.rows
            .iter()
            .find(|row| row.get(column).is_some_and(|cell| predicate(cell)))
            .map(Vec::as_slice)
    }
}

fn clean_header(header: &str) -> String {
    header
        .trim_matches(|c: char| c == '"' || c == '\u{feff}' || c.is_whitespace())
        .to_string()
}

/// 已解析位置的欄位
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFields {
    columns: Vec<(&'static str, Option<usize>)>,
}

impl ResolvedFields {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, index)| *index)
    }

    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.index_of(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }

    /// 將一列資料轉為以語意名稱為鍵的觀測值，找不到的欄位不會出現在結果中
    pub fn observe(&self, kind: SourceKind, date: NaiveDate, row: &[String]) -> RawObservation {
        let values: HashMap<&'static str, String> = self
            .columns
            .iter()
            .filter_map(|(name, index)| {
                index
                    .and_then(|i| row.get(i))
                    .map(|cell| (*name, cell.trim().to_string()))
            })
            .collect();

        RawObservation { kind, date, values }
    }
}
