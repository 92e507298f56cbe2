use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Result;
use config::{Config as config_config, File as config_file};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{error::FusionError, logging};

const CONFIG_PATH: &str = "app.json";

/// 分析天數的預設值
pub const DEFAULT_LOOKBACK_DAYS: usize = 60;
/// 分析天數的上限，約十年的交易日
pub const MAX_LOOKBACK_DAYS: usize = 2500;
/// 圖表與資料輸出的預設目錄
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub pipeline: Pipeline,
}

const PIPELINE_LOOKBACK_DAYS: &str = "PIPELINE_LOOKBACK_DAYS";
const PIPELINE_OUTPUT_DIR: &str = "PIPELINE_OUTPUT_DIR";
const PIPELINE_CACHE_DIR: &str = "PIPELINE_CACHE_DIR";
const PIPELINE_REQUEST_INTERVAL_MS: &str = "PIPELINE_REQUEST_INTERVAL_MS";
const PIPELINE_REQUEST_TIMEOUT_SECS: &str = "PIPELINE_REQUEST_TIMEOUT_SECS";
const PIPELINE_MAX_RETRIES: &str = "PIPELINE_MAX_RETRIES";
const PIPELINE_MAX_IN_FLIGHT: &str = "PIPELINE_MAX_IN_FLIGHT";
const PIPELINE_PAYLOAD_TTL_SECS: &str = "PIPELINE_PAYLOAD_TTL_SECS";
const PIPELINE_INCLUDE_LENDING: &str = "PIPELINE_INCLUDE_LENDING";
const PIPELINE_INCLUDE_LARGE_HOLDER: &str = "PIPELINE_INCLUDE_LARGE_HOLDER";

/// 資料整合流程的參數
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Pipeline {
    pub lookback_days: usize,
    pub output_dir: String,
    /// 借券等日報 CSV 的暫存目錄
    pub cache_dir: String,
    /// 兩次請求之間的最小間隔
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub max_in_flight: usize,
    pub payload_ttl_secs: u64,
    pub include_lending: bool,
    pub include_large_holder: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            cache_dir: "data".to_string(),
            request_interval_ms: 100,
            request_timeout_secs: 5,
            max_retries: 2,
            max_in_flight: 1,
            payload_ttl_secs: 600,
            include_lending: true,
            include_large_holder: true,
        }
    }
}

impl Pipeline {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn payload_ttl(&self) -> Duration {
        Duration::from_secs(self.payload_ttl_secs)
    }
}

pub static SETTINGS: Lazy<App> = Lazy::new(App::new);

impl App {
    /// 讀取 app.json，讀不到或格式錯誤時使用預設值，最後再以 env 覆蓋
    pub fn new() -> Self {
        match Self::get() {
            Ok(app) => app,
            Err(why) => {
                logging::error_file_async(format!(
                    "I can't read the config context because {:?}",
                    why
                ));
                App::default().override_with_env()
            }
        }
    }

    fn get() -> Result<Self> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize()?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        let p = &mut self.pipeline;

        override_parsed(PIPELINE_LOOKBACK_DAYS, &mut p.lookback_days);

        if let Ok(dir) = env::var(PIPELINE_OUTPUT_DIR) {
            p.output_dir = dir;
        }

        if let Ok(dir) = env::var(PIPELINE_CACHE_DIR) {
            p.cache_dir = dir;
        }

        override_parsed(PIPELINE_REQUEST_INTERVAL_MS, &mut p.request_interval_ms);
        override_parsed(PIPELINE_REQUEST_TIMEOUT_SECS, &mut p.request_timeout_secs);
        override_parsed(PIPELINE_MAX_RETRIES, &mut p.max_retries);
        override_parsed(PIPELINE_MAX_IN_FLIGHT, &mut p.max_in_flight);
        override_parsed(PIPELINE_PAYLOAD_TTL_SECS, &mut p.payload_ttl_secs);
        override_parsed(PIPELINE_INCLUDE_LENDING, &mut p.include_lending);
        override_parsed(PIPELINE_INCLUDE_LARGE_HOLDER, &mut p.include_large_holder);

        self
    }
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = env::var(key) {
        match T::from_str(raw.trim()) {
            Ok(v) => *target = v,
            Err(_) => {
                logging::warn_file_async(format!("Ignore invalid env {}={}", key, raw));
            }
        }
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

/// 使用者一次分析請求的參數
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub ticker: String,
    pub lookback_days: usize,
    pub output_dir: PathBuf,
}

impl Request {
    /// 檢查呼叫端提供的參數，尚未發出任何網路請求前就回報錯誤。
    ///
    /// 股票代號缺漏或含非英數字元時回傳 [`FusionError::Configuration`]；
    /// 天數不是正整數或超過 [`MAX_LOOKBACK_DAYS`] 時不視為錯誤，改用預設天數。
    pub fn resolve(
        ticker: Option<&str>,
        lookback: Option<&str>,
        output_dir: Option<&str>,
        defaults: &Pipeline,
    ) -> Result<Self, FusionError> {
        let ticker = ticker.map(str::trim).unwrap_or_default();
        if ticker.is_empty() {
            return Err(FusionError::Configuration(
                "ticker is required".to_string(),
            ));
        }

        if !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FusionError::Configuration(format!(
                "ticker '{}' must contain only letters and digits",
                ticker
            )));
        }

        let fallback = if (1..=MAX_LOOKBACK_DAYS).contains(&defaults.lookback_days) {
            defaults.lookback_days
        } else {
            DEFAULT_LOOKBACK_DAYS
        };

        let lookback_days = match lookback.map(str::trim).filter(|s| !s.is_empty()) {
            None => fallback,
            Some(raw) => match raw.parse::<usize>() {
                Ok(days) if (1..=MAX_LOOKBACK_DAYS).contains(&days) => days,
                _ => {
                    logging::warn_file_async(format!(
                        "lookback '{}' is not an integer between 1 and {}, use {} instead",
                        raw, MAX_LOOKBACK_DAYS, fallback
                    ));
                    fallback
                }
            },
        };

        let output_dir = output_dir
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&defaults.output_dir);

        Ok(Request {
            ticker: ticker.to_uppercase(),
            lookback_days,
            output_dir: PathBuf::from(output_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let p = Pipeline::default();
        assert_eq!(p.lookback_days, 60);
        assert_eq!(p.output_dir, "output");
        assert_eq!(p.request_interval(), Duration::from_millis(100));
        assert_eq!(p.request_timeout(), Duration::from_secs(5));
        assert!(p.include_lending);
        assert!(p.include_large_holder);
    }

    #[test]
    fn test_pipeline_partial_json() {
        let p: Pipeline = serde_json::from_str(r#"{"lookback_days": 20}"#).unwrap();
        assert_eq!(p.lookback_days, 20);
        assert_eq!(p.output_dir, "output");
        assert_eq!(p.max_retries, 2);
    }

    #[test]
    fn test_resolve_requires_ticker() {
        let defaults = Pipeline::default();
        let err = Request::resolve(None, Some("10"), None, &defaults).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));

        let err = Request::resolve(Some("   "), None, None, &defaults).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));

        let err = Request::resolve(Some("23 82"), None, None, &defaults).unwrap_err();
        assert!(matches!(err, FusionError::Configuration(_)));
    }

    #[test]
    fn test_resolve_falls_back_to_default_lookback() {
        let defaults = Pipeline::default();
        for raw in ["abc", "0", "-5", "1.5", "2501", "9223372036854775807", "99999999999999999999"] {
            let r = Request::resolve(Some("2382"), Some(raw), None, &defaults).unwrap();
            assert_eq!(r.lookback_days, 60, "input {}", raw);
        }

        let r = Request::resolve(Some(" 2382 "), Some(" 15 "), Some("charts"), &defaults).unwrap();
        assert_eq!(r.ticker, "2382");
        assert_eq!(r.lookback_days, 15);
        assert_eq!(r.output_dir, PathBuf::from("charts"));

        let r = Request::resolve(Some("0050"), None, None, &defaults).unwrap();
        assert_eq!(r.lookback_days, 60);
        assert_eq!(r.output_dir, PathBuf::from("output"));

        let r = Request::resolve(Some("2382"), Some("2500"), None, &defaults).unwrap();
        assert_eq!(r.lookback_days, MAX_LOOKBACK_DAYS);
    }

    #[test]
    fn test_resolve_ignores_oversized_default() {
        let defaults = Pipeline {
            lookback_days: usize::MAX,
            ..Pipeline::default()
        };
        let r = Request::resolve(Some("2382"), None, None, &defaults).unwrap();
        assert_eq!(r.lookback_days, DEFAULT_LOOKBACK_DAYS);
    }
}
