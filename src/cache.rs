//! 暫存快取。
//!
//! 1. [`PayloadCache`]：程序內的 TTL 快取，同一段期間重複查詢時不再向證交所請求。
//! 2. [`DownloadCache`]：借券日報原始 CSV 的檔案暫存，下次執行可直接讀取。

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use moka::sync::Cache;

use crate::{crawler::RawPayload, declare::SourceKind, util::datetime, util::map::Keyable};

/// 遠端資料的鍵：來源、日期鍵與股票代號
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadKey {
    pub kind: SourceKind,
    pub key: NaiveDate,
    pub ticker: String,
}

impl PayloadKey {
    pub fn new(kind: SourceKind, key: NaiveDate, ticker: &str) -> Self {
        PayloadKey {
            kind,
            key,
            ticker: ticker.to_string(),
        }
    }
}

impl Keyable for PayloadKey {
    fn key(&self) -> String {
        // 只有個股日成交資訊依股票代號查詢，其他報表為全市場
        match self.kind {
            SourceKind::PriceVolume => format!(
                "{}:{}:{}",
                self.kind,
                datetime::compact(self.key),
                self.ticker
            ),
            _ => format!("{}:{}", self.kind, datetime::compact(self.key)),
        }
    }

    fn key_with_prefix(&self) -> String {
        format!("Payload:{}", self.key())
    }
}

/// 已驗證過的遠端回應
pub struct PayloadCache {
    inner: Cache<String, RawPayload>,
}

impl PayloadCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        PayloadCache {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
        }
    }

    pub fn get(&self, key: &PayloadKey) -> Option<RawPayload> {
        self.inner.get(&key.key_with_prefix())
    }

    pub fn insert(&self, key: &PayloadKey, payload: RawPayload) {
        self.inner.insert(key.key_with_prefix(), payload);
    }
}

/// 原始下載檔的存放位置
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DownloadCache { root: root.into() }
    }

    /// 只有借券日報會落地保存
    pub fn path_for(&self, kind: SourceKind, key: NaiveDate) -> Option<PathBuf> {
        match kind {
            SourceKind::Lending => Some(
                self.root
                    .join("twt93u")
                    .join(format!("TWT93U_{}.csv", datetime::compact(key))),
            ),
            _ => None,
        }
    }

    /// 檔案存在且非空時回傳內容
    pub fn read(&self, kind: SourceKind, key: NaiveDate) -> Option<Vec<u8>> {
        let path = self.path_for(kind, key)?;
        let bytes = fs::read(path).ok()?;
        if bytes.is_empty() {
            return None;
        }

        Some(bytes)
    }

    /// 當天的報表可能尚未公布完整，只保存今天以前的檔案
    pub fn write(&self, kind: SourceKind, key: NaiveDate, bytes: &[u8]) -> Result<Option<PathBuf>> {
        let Some(path) = self.path_for(kind, key) else {
            return Ok(None);
        };

        if key >= Local::now().date_naive() || bytes.is_empty() {
            return Ok(None);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_payload_key() {
        let price = PayloadKey::new(SourceKind::PriceVolume, ymd(2024, 1, 1), "2382");
        assert_eq!(price.key(), "price_volume:20240101:2382");

        // 全市場報表不同股票共用同一份
        let a = PayloadKey::new(SourceKind::Institutional, ymd(2024, 1, 2), "2382");
        let b = PayloadKey::new(SourceKind::Institutional, ymd(2024, 1, 2), "2330");
        assert_eq!(a.key_with_prefix(), b.key_with_prefix());
    }

    #[test]
    fn test_payload_cache() {
        let cache = PayloadCache::new(Duration::from_secs(60), 16);
        let key = PayloadKey::new(SourceKind::Lending, ymd(2024, 1, 2), "2382");
        assert!(cache.get(&key).is_none());

        let payload = RawPayload::text(SourceKind::Lending, ymd(2024, 1, 2), "x");
        cache.insert(&key, payload.clone());
        assert_eq!(cache.get(&key), Some(payload));
    }

    #[test]
    fn test_download_cache_round_trip() {
        let root = std::env::temp_dir().join(format!("twse_chip_cache_{}", std::process::id()));
        let cache = DownloadCache::new(&root);
        let key = ymd(2024, 1, 2);

        assert!(cache.path_for(SourceKind::Institutional, key).is_none());
        assert!(cache.read(SourceKind::Lending, key).is_none());

        let written = cache.write(SourceKind::Lending, key, b"abc").unwrap().unwrap();
        assert!(written.ends_with("twt93u/TWT93U_20240102.csv"));
        assert_eq!(cache.read(SourceKind::Lending, key), Some(b"abc".to_vec()));

        // 今天的檔案不保存
        let today = Local::now().date_naive();
        assert!(cache.write(SourceKind::Lending, today, b"abc").unwrap().is_none());

        fs::remove_dir_all(&root).ok();
    }
}
