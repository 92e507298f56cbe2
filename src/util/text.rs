use std::{collections::HashSet, str::FromStr};

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::logging;

const NUMBER_ESCAPE_CHAR: &[char] = &['元', '%', ',', ' ', '"', '=', '\n', '\r'];

/// 證交所的一張為 1000 股
pub const SHARES_PER_LOT: i64 = 1000;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

/// Decodes a response body into a UTF-8 `String`.
///
/// 證交所的 CSV 以 Big5 (cp950) 編碼，JSON 則是 UTF-8。
/// 先嘗試 UTF-8，失敗時改以 Big5 解碼，無法對應的字元以替代字元取代。
pub fn decode_body(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => big5_2_utf8(data),
    }
}

/// Converts a Big5 encoded slice to a UTF-8 `String`.
pub fn big5_2_utf8(data: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::BIG5.decode(data);
    if had_errors {
        logging::warn_file_async(format!(
            "Big5 decode replaced malformed bytes ({} bytes input)",
            data.len()
        ));
    }

    text.into_owned()
}

/// Parses a decimal value from a given string.
///
/// Thousands separators and the characters in `NUMBER_ESCAPE_CHAR` are removed
/// before parsing; `escape_chars` adds more characters to remove.
///
/// # Example
///
/// ```
/// let s = "1,234.56";
/// let decimal_value = parse_decimal(s, None).unwrap();
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// Parses an `i64` value from a given string.
///
/// # Example
///
/// ```
/// let s = "-12,345,000";
/// let i64_value = parse_i64(s, None).unwrap();
/// ```
pub fn parse_i64(s: &str, escape_chars: Option<Vec<char>>) -> Result<i64> {
    let cleaned = clean_escape_chars(s, escape_chars);
    i64::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as i64 because: {:?}", cleaned, why))
}

/// Removes a set of escape characters from a given string.
///
/// # Example
///
/// ```
/// let s = "Hello$Wor^ld!@#";
/// let escape_chars = Some(vec!['$', '^', '@', '#']);
/// let clean_s = clean_escape_chars(s, escape_chars);
/// assert_eq!(clean_s, "HelloWorld!");
/// ```
pub fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.chars().filter(|c| !filters.contains(c)).collect()
}

/// 股數換算為張數，負數向下取整，-500 股為 -1 張
pub fn to_lots(shares: i64) -> i64 {
    shares.div_euclid(SHARES_PER_LOT)
}

/// 去除 T86 等報表在代號前後加上的 `="` 與空白
pub fn strip_security_code(code: &str) -> &str {
    code.trim_matches(|c: char| c == '=' || c == '"' || c.is_whitespace())
}

/// 取出代號欄位中的第一段數字，例如 `2330 *` → `2330`
pub fn first_digit_run(s: &str) -> Option<&str> {
    DIGIT_RUN.find(s).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    // 注意這個慣用法：在 tests 模組中，從外部範疇匯入所有名字。
    use super::*;

    #[test]
    fn test_big5_to_utf8() {
        // 「證券代號」的 Big5 編碼
        let big5: &[u8] = &[0xC3, 0xD2, 0xA8, 0xE9, 0xA5, 0x4E, 0xB8, 0xB9];
        assert_eq!(decode_body(big5), "證券代號");
        assert_eq!(decode_body("日期".as_bytes()), "日期");
        assert_eq!(decode_body(b"\xEF\xBB\xBFstat"), "stat");
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_i64("12,345,000", None).unwrap(), 12_345_000);
        assert_eq!(parse_i64("\"-1,000\"", None).unwrap(), -1000);
        assert_eq!(parse_decimal("1,234.56", None).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal("12.34%", None).unwrap(), dec!(12.34));
        assert!(parse_decimal("--", None).is_err());
        assert!(parse_i64("", None).is_err());
    }

    #[test]
    fn test_to_lots() {
        assert_eq!(to_lots(12_345_000), 12345);
        assert_eq!(to_lots(500), 0);
        assert_eq!(to_lots(1_000_000), 1000);
        assert_eq!(to_lots(-500_000), -500);
        assert_eq!(to_lots(-500), -1);
    }

    #[test]
    fn test_clean_escape_chars() {
        let result = clean_escape_chars("台積電% 元 ,", Some(vec!['台']));
        assert_eq!(result, "積電");
    }

    #[test]
    fn test_security_code_helpers() {
        assert_eq!(strip_security_code("=\"2382\" "), "2382");
        assert_eq!(strip_security_code("2382"), "2382");
        assert_eq!(first_digit_run("2330 *"), Some("2330"));
        assert_eq!(first_digit_run("合計"), None);
    }
}
