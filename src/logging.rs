use chrono::{format::DelayedFormat, Local};
use crossbeam_channel::{bounded, unbounded, Sender};
use once_cell::sync::Lazy;
use std::{
    fmt::Write as _,
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

const LOG_DIR: &str = "log";
const FLUSH_THRESHOLD: usize = 2048;

/// 程序結束前等待寫檔線程的上限
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

enum Message {
    Line(String),
    /// 寫出緩衝後回覆
    Flush(Sender<()>),
}

/// 以背景線程寫檔的日誌器，每個等級各自一個檔案
pub struct Logger {
    info_writer: Sender<Message>,
    warn_writer: Sender<Message>,
    error_writer: Sender<Message>,
    debug_writer: Sender<Message>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        Logger {
            info_writer: Self::create_writer(&format!("{}_info", log_name)),
            warn_writer: Self::create_writer(&format!("{}_warn", log_name)),
            error_writer: Self::create_writer(&format!("{}_error", log_name)),
            debug_writer: Self::create_writer(&format!("{}_debug", log_name)),
        }
    }

    pub fn info(&self, log: String) {
        self.send(log, &self.info_writer);
    }

    pub fn warn(&self, log: String) {
        self.send(log, &self.warn_writer);
    }

    pub fn error(&self, log: String) {
        self.send(log, &self.error_writer);
    }

    pub fn debug(&self, log: String) {
        self.send(log, &self.debug_writer);
    }

    /// 等待已送出的訊息寫入檔案，全部完成時回傳 true
    pub fn flush(&self, timeout: Duration) -> bool {
        [
            &self.info_writer,
            &self.warn_writer,
            &self.error_writer,
            &self.debug_writer,
        ]
        .into_iter()
        .all(|writer| {
            let (ack, done) = bounded::<()>(1);
            writer.send(Message::Flush(ack)).is_ok() && done.recv_timeout(timeout).is_ok()
        })
    }

    fn send(&self, msg: String, writer: &Sender<Message>) {
        if let Err(why) = writer.send(Message::Line(msg)) {
            error_console(format!("Failed to send log because {}", why));
        }
    }

    fn create_writer(log_name: &str) -> Sender<Message> {
        let (tx, rx) = unbounded::<Message>();
        let log_path = match Self::get_log_path(log_name) {
            Some(p) => p,
            None => {
                error_console(format!("Failed to create log directory for {}", log_name));
                // 無法建立目錄時只輸出到 console
                thread::spawn(move || {
                    for received in &rx {
                        echo_console(received);
                    }
                });
                return tx;
            }
        };

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
                Ok(f) => f,
                Err(why) => {
                    error_console(format!(
                        "Failed to open log file {}. because:{:?}",
                        log_path.display(),
                        why
                    ));
                    for received in &rx {
                        echo_console(received);
                    }
                    return;
                }
            };

            let mut writer = BufWriter::new(file);
            let mut line = String::with_capacity(FLUSH_THRESHOLD);

            for received in &rx {
                let ack = match received {
                    Message::Line(msg) => {
                        if writeln!(&mut line, "{} {}", Local::now().format("%F %X%.6f"), msg)
                            .is_err()
                        {
                            continue;
                        }
                        None
                    }
                    Message::Flush(ack) => Some(ack),
                };

                if ack.is_some() || rx.is_empty() || line.len() >= FLUSH_THRESHOLD {
                    if let Err(why) = writer.write_all(line.as_bytes()) {
                        error_console(format!(
                            "Failed to write to log file. because:{:#?}\r\nmsg:{}",
                            why, line
                        ));
                    }

                    if let Err(why) = writer.flush() {
                        error_console(format!("Failed to flush log file. because:{:#?}", why));
                    }

                    line.clear();
                }

                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        });

        tx
    }

    fn get_log_path(name: &str) -> Option<PathBuf> {
        let path = Path::new(LOG_DIR);

        if !path.exists() {
            fs::create_dir_all(path).ok()?;
        }

        let mut log_path = PathBuf::from(path);
        log_path.push(format!("{}_{}.log", Local::now().format("%Y-%m-%d"), name));

        Some(log_path)
    }
}

/// 程序結束前呼叫，避免背景線程還沒寫完就被終止
pub fn flush() -> bool {
    LOGGER.flush(FLUSH_TIMEOUT)
}

fn echo_console(received: Message) {
    match received {
        Message::Line(msg) => info_console(msg),
        Message::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    eprintln!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_dated() {
        let path = Logger::get_log_path("unit").unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with(&Local::now().format("%Y-%m-%d").to_string()));
        assert!(file_name.ends_with("_unit.log"));
    }

    #[test]
    fn test_named_logger_accepts_messages() {
        let logger = Logger::new("logging_test");
        logger.info("info line".to_string());
        logger.warn("warn line".to_string());
        logger.error("error line".to_string());
        logger.debug("debug line".to_string());
        debug_file_async("default logger line".to_string());
    }

    #[test]
    fn test_flush_writes_pending_lines() {
        let logger = Logger::new("logging_flush_test");
        logger.warn("line before exit".to_string());
        assert!(logger.flush(Duration::from_secs(5)));

        let path = Logger::get_log_path("logging_flush_test_warn").unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("line before exit"));
    }
}
