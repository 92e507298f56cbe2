use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use once_cell::sync::{Lazy, OnceCell};
use reqwest::{header::HeaderMap, Client, Method};

use crate::{error::FetchFailure, logging::Logger};

pub mod user_agent;

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// Returns the reqwest client singleton instance or creates one if it doesn't exist.
///
/// 單次請求的逾時由呼叫端透過 [`get_bytes`] 的 `timeout` 指定，
/// 這裡只設定連線層級的參數。
fn get_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        // reqwest 以 rustls-no-provider 編譯，建立 client 前需先安裝 crypto provider，
        // 已安裝過時回傳的 Err 可忽略
        let _ = rustls::crypto::ring::default_provider().install_default();

        Client::builder()
            // ===== 壓縮 =====
            .brotli(true)
            .gzip(true)
            .zstd(true)
            // ===== 超時設置 =====
            .connect_timeout(Duration::from_secs(5))
            // ===== TCP 優化 =====
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            // ===== 連接池 =====
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            // ===== Cookie 和重定向 =====
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            // ===== Headers =====
            .referer(true)
            .user_agent(user_agent::gen_random_ua())
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
    })
}

/// Performs a single HTTP GET request and returns the raw body.
///
/// 這裡不做重試，失敗會依原因分類成 [`FetchFailure`]，
/// 由上層決定是否重試或略過該日期。
///
/// # Arguments
///
/// * `url`: The URL to send the GET request to.
/// * `headers`: An optional set of headers to include with the request.
/// * `timeout`: Total time allowed for the request, body included.
pub async fn get_bytes(
    url: &str,
    headers: Option<HeaderMap>,
    timeout: Duration,
) -> Result<Vec<u8>, FetchFailure> {
    let visit_log = format!("{}:{}", Method::GET, url);
    let client = get_client().map_err(|why| FetchFailure::Transport(why.to_string()))?;
    let mut rb = client.request(Method::GET, url).timeout(timeout);

    if let Some(h) = headers {
        rb = rb.headers(h);
    }

    let start = Instant::now();
    let response = match rb.send().await {
        Ok(response) => response,
        Err(why) => {
            LOGGER.error(format!(
                "{} failed because {:?}. {} ms",
                visit_log,
                why,
                start.elapsed().as_millis()
            ));
            return Err(classify(&why));
        }
    };

    let status = response.status();
    if !status.is_success() {
        LOGGER.warn(format!(
            "{} responded {}. {} ms",
            visit_log,
            status,
            start.elapsed().as_millis()
        ));
        return Err(FetchFailure::Status(status.as_u16()));
    }

    let body = response.bytes().await.map_err(|why| {
        LOGGER.error(format!("{} body failed because {:?}", visit_log, why));
        classify(&why)
    })?;

    LOGGER.info(format!(
        "{} {} bytes {} ms",
        visit_log,
        body.len(),
        start.elapsed().as_millis()
    ));

    Ok(body.to_vec())
}

fn classify(why: &reqwest::Error) -> FetchFailure {
    if why.is_timeout() {
        FetchFailure::Timeout
    } else if why.is_decode() {
        FetchFailure::Malformed(why.to_string())
    } else {
        FetchFailure::Transport(why.to_string())
    }
}
