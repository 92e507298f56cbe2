use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use concat_string::concat_string;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{
    cache::{DownloadCache, PayloadCache, PayloadKey},
    config::Pipeline,
    crawler::{pacer::Pacer, Fetch, FetchOutcome, RawPayload},
    declare::SourceKind,
    error::FetchFailure,
    logging,
    util::{self, datetime},
};

/// 三大法人買賣超日報
pub mod institutional;
/// 千張大戶持股比率
pub mod large_holder;
/// 融券借券賣出餘額
pub mod lending;
/// 個股日成交資訊
pub mod price;

const HOST: &str = "twse.com.tw";

/// 快取最多保留的回應數
const PAYLOAD_CAPACITY: u64 = 1024;

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/csv, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(
        header::REFERER,
        HeaderValue::from_static("https://www.twse.com.tw/zh/"),
    );
    headers
}

fn default_base_url() -> String {
    concat_string!("https://www.", HOST)
}

/// 各來源的查詢網址，`key` 為 [`SourceKind::key_for`] 算出的日期鍵
pub fn endpoint(kind: SourceKind, key: NaiveDate, ticker: &str) -> String {
    endpoint_at(&default_base_url(), kind, key, ticker)
}

fn endpoint_at(base: &str, kind: SourceKind, key: NaiveDate, ticker: &str) -> String {
    let date = datetime::compact(kind.key_for(key));
    match kind {
        SourceKind::Institutional => format!(
            "{base}/fund/T86?response=json&date={date}&selectType=ALL",
            base = base,
            date = date
        ),
        SourceKind::PriceVolume => format!(
            "{base}/exchangeReport/STOCK_DAY?response=csv&date={date}&stockNo={ticker}",
            base = base,
            date = date,
            ticker = ticker
        ),
        SourceKind::LargeHolder => format!(
            "{base}/fund/BWIBBU_d?response=csv&date={date}&selectType=ALL",
            base = base,
            date = date
        ),
        SourceKind::Lending => format!(
            "{base}/exchangeReport/TWT93U?response=csv&date={date}",
            base = base,
            date = date
        ),
    }
}

/// 檢查回應內容是否可用，並轉成 [`RawPayload`]
pub(crate) fn validate(kind: SourceKind, key: NaiveDate, bytes: &[u8]) -> FetchOutcome {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchFailure::NoData("empty body".to_string()));
    }

    let text = util::text::decode_body(bytes);
    match kind {
        SourceKind::Institutional => {
            let value: Value = serde_json::from_str(&text)
                .map_err(|why| FetchFailure::Malformed(why.to_string()))?;
            let stat = value
                .get("stat")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();

            if !stat.eq_ignore_ascii_case("OK") {
                let reason = if stat.is_empty() { "missing stat" } else { stat };
                return Err(FetchFailure::NoData(reason.to_string()));
            }

            Ok(RawPayload::json(kind, key, value))
        }
        SourceKind::PriceVolume | SourceKind::LargeHolder | SourceKind::Lending => {
            Ok(RawPayload::text(kind, key, text))
        }
    }
}

/// 向證交所取得報表，帶有節流、重試與快取
pub struct TwseFetcher {
    base_url: String,
    pacer: Pacer,
    timeout: Duration,
    max_retries: usize,
    payloads: PayloadCache,
    downloads: Option<DownloadCache>,
}

impl TwseFetcher {
    pub fn new(pacer: Pacer, timeout: Duration, max_retries: usize, ttl: Duration) -> Self {
        TwseFetcher {
            base_url: default_base_url(),
            pacer,
            timeout,
            max_retries,
            payloads: PayloadCache::new(ttl, PAYLOAD_CAPACITY),
            downloads: None,
        }
    }

    pub fn from_settings(pipeline: &Pipeline) -> Self {
        let pacer = Pacer::new(pipeline.request_interval(), pipeline.max_in_flight);
        let fetcher = Self::new(
            pacer,
            pipeline.request_timeout(),
            pipeline.max_retries,
            pipeline.payload_ttl(),
        );

        match pipeline.cache_dir.trim() {
            "" => fetcher,
            dir => fetcher.with_download_cache(DownloadCache::new(dir)),
        }
    }

    /// 改向其他主機請求，例如鏡像站
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_download_cache(mut self, downloads: DownloadCache) -> Self {
        self.downloads = Some(downloads);
        self
    }

    async fn request(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let _permit = self.pacer.acquire().await;
        util::http::get_bytes(url, Some(build_headers()), self.timeout).await
    }

    fn read_download(&self, kind: SourceKind, key: NaiveDate) -> Option<RawPayload> {
        let bytes = self.downloads.as_ref()?.read(kind, key)?;
        match validate(kind, key, &bytes) {
            Ok(payload) => Some(payload),
            Err(why) => {
                logging::warn_file_async(format!(
                    "Ignore cached {} {} because {}",
                    kind, key, why
                ));
                None
            }
        }
    }

    fn write_download(&self, kind: SourceKind, key: NaiveDate, bytes: &[u8]) {
        let Some(downloads) = &self.downloads else {
            return;
        };

        if let Err(why) = downloads.write(kind, key, bytes) {
            logging::warn_file_async(format!(
                "Failed to keep {} {} on disk because {:?}",
                kind, key, why
            ));
        }
    }
}

#[async_trait]
impl Fetch for TwseFetcher {
    async fn fetch(&self, kind: SourceKind, key: NaiveDate, ticker: &str) -> FetchOutcome {
        let cache_key = PayloadKey::new(kind, key, ticker);
        if let Some(payload) = self.payloads.get(&cache_key) {
            return Ok(payload);
        }

        if let Some(payload) = self.read_download(kind, key) {
            self.payloads.insert(&cache_key, payload.clone());
            return Ok(payload);
        }

        let url = endpoint_at(&self.base_url, kind, key, ticker);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .map(jitter)
            .take(self.max_retries);
        let bytes = RetryIf::spawn(
            strategy,
            || self.request(&url),
            |why: &FetchFailure| {
                let retry = why.is_retryable();
                if retry {
                    logging::warn_file_async(format!("Retry {} because {}", url, why));
                }
                retry
            },
        )
        .await?;

        let payload = validate(kind, key, &bytes)?;
        self.write_download(kind, key, &bytes);
        self.payloads.insert(&cache_key, payload.clone());

        Ok(payload)
    }
}
