use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
};

use chrono::Local;
use clap::Parser;

use crate::{
    config::{Request, SETTINGS},
    crawler::twse::TwseFetcher,
    error::FusionError,
    fusion::{AlignOptions, AlignedTable, DataAligner},
};

pub mod artifact;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod error;
pub mod fusion;
pub mod logging;
pub mod util;

/// 整合證交所三大法人買賣超、股價與借券資料
#[derive(Parser, Debug)]
#[command(name = "twse_chip", version)]
struct Cli {
    /// 股票代號，例如 2382。未提供時會互動詢問
    ticker: Option<String>,

    /// 分析天數 (交易日)，格式錯誤時使用預設值
    lookback: Option<String>,

    /// 輸出目錄，預設取自 app.json
    #[arg(long)]
    output_dir: Option<String>,

    /// 輸出檔名中的用途
    #[arg(long, default_value = artifact::INSTITUTIONS_AND_PRICE)]
    purpose: String,

    /// 單一法人買賣超超過此張數時列為大額交易日
    #[arg(long, default_value_t = artifact::LARGE_TRADE_LOTS)]
    large_trade_lots: i64,

    /// 流通在外股數，提供時一併列出週轉率
    #[arg(long)]
    float_shares: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let code = run(Cli::parse()).await;

    // 寫檔線程不會等主程序，結束前先把日誌寫完
    if !logging::flush() {
        logging::error_console("Failed to flush log files before exit".to_string());
    }

    code
}

async fn run(cli: Cli) -> ExitCode {
    // 沒有帶參數時視為互動模式，兩個值都用詢問的
    let interactive = cli.ticker.is_none();
    let ticker = cli
        .ticker
        .or_else(|| prompt("請輸入股票代號（如 2382）："));
    let lookback = match cli.lookback {
        Some(lookback) => Some(lookback),
        None if interactive => prompt("請輸入分析天數（如 60）："),
        None => None,
    };

    let pipeline = &SETTINGS.pipeline;
    let request = match Request::resolve(
        ticker.as_deref(),
        lookback.as_deref(),
        cli.output_dir.as_deref(),
        pipeline,
    ) {
        Ok(request) => request,
        Err(why) => {
            logging::error_console(why.to_string());
            return ExitCode::from(1);
        }
    };

    logging::info_file_async(format!("Start {:?}", request));

    let fetcher = TwseFetcher::from_settings(pipeline);
    let aligner = DataAligner::new(fetcher, AlignOptions::from(pipeline));
    let table = match aligner.align(&request.ticker, request.lookback_days).await {
        Ok(table) => table,
        Err(why @ FusionError::Configuration(_)) => {
            logging::error_console(why.to_string());
            return ExitCode::from(1);
        }
        Err(why @ FusionError::Empty(_)) => {
            logging::error_console(why.to_string());
            logging::warn_file_async(format!("{} {}", request.ticker, why));
            return ExitCode::from(2);
        }
    };

    let today = Local::now().date_naive();
    match artifact::write_csv(&table, &request.output_dir, &cli.purpose, today) {
        Ok(path) => logging::info_console(format!("已輸出 {}", path.display())),
        Err(why) => {
            logging::error_console(format!("Failed to write csv because {:?}", why));
            return ExitCode::FAILURE;
        }
    }

    report(&table, cli.large_trade_lots, cli.float_shares);

    ExitCode::SUCCESS
}

/// 從標準輸入讀取一行，空白或讀取失敗時回傳 None
fn prompt(message: &str) -> Option<String> {
    print!("{}", message);
    io::stdout().flush().ok()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;

    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

fn report(table: &AlignedTable, large_trade_lots: i64, float_shares: Option<i64>) {
    let first = table.rows.first().map(|r| r.date.to_string()).unwrap_or_default();
    let last = table.rows.last().map(|r| r.date.to_string()).unwrap_or_default();
    logging::info_console(format!(
        "{} 共 {} 個交易日 ({} ~ {})",
        table.ticker,
        table.len(),
        first,
        last
    ));

    for (kind, stats) in &table.stats {
        logging::info_console(format!(
            "{}: attempted {} succeeded {} failed {} schema mismatches {} rows {}",
            kind,
            stats.attempted,
            stats.succeeded,
            stats.failed,
            stats.schema_mismatches,
            stats.rows
        ));
    }

    let large_trades = artifact::large_trade_days(table, large_trade_lots);
    if !large_trades.is_empty() {
        let dates: Vec<String> = large_trades.iter().map(|d| d.to_string()).collect();
        logging::info_console(format!(
            "大額交易日 (>{} 張): {}",
            large_trade_lots,
            dates.join(", ")
        ));
    }

    if let Some(float_shares) = float_shares {
        for (date, rate) in artifact::turnover_rates(table, float_shares) {
            if let Some(rate) = rate {
                logging::info_console(format!("{} 週轉率 {}%", date, rate));
            }
        }
    }
}
