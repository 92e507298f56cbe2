use rand::prelude::*;

const FIREFOX_VERSIONS: [&str; 12] = [
    "133.0", "132.0", "131.0", "130.0", "129.0", "128.0", "127.0", "126.0", "125.0", "124.0",
    "123.0", "122.0",
];

const CHROME_VERSIONS: [&str; 12] = [
    "133.0.6943.60", "133.0.6943.88", "132.0.6834.83", "132.0.6834.110", "131.0.6778.85",
    "131.0.6778.108", "130.0.6723.92", "130.0.6723.117", "129.0.6668.70", "129.0.6668.89",
    "128.0.6613.120", "127.0.6533.119",
];

const EDGE_VERSIONS: [&str; 8] = [
    "133.0.3048.56", "133.0.3048.46", "132.0.2957.55", "131.0.2903.86", "130.0.2849.68",
    "129.0.2792.52", "128.0.2739.79", "127.0.2651.98",
];

/// 證交所只需要看起來像桌面瀏覽器的 UA
const DESKTOP_OS: [&str; 10] = [
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; WOW64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 14_7_1",
    "Macintosh; Intel Mac OS X 15_2",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
    "X11; Fedora; Linux x86_64",
];

fn gen_firefox_ua() -> String {
    let mut rng = rand::rng();
    let version = FIREFOX_VERSIONS[rng.random_range(0..FIREFOX_VERSIONS.len())];
    let os = DESKTOP_OS[rng.random_range(0..DESKTOP_OS.len())];

    format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        os, version, version
    )
}

fn gen_chrome_ua() -> String {
    let mut rng = rand::rng();
    let version = CHROME_VERSIONS[rng.random_range(0..CHROME_VERSIONS.len())];
    let os = DESKTOP_OS[rng.random_range(0..DESKTOP_OS.len())];

    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        os, version
    )
}

fn gen_edge_ua() -> String {
    let mut rng = rand::rng();
    let version = EDGE_VERSIONS[rng.random_range(0..EDGE_VERSIONS.len())];
    // Edge 只出現在 Windows 與 macOS
    let os = DESKTOP_OS[rng.random_range(0..7)];
    let chrome_ver = version.split('.').next().unwrap_or("133");

    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36 Edg/{}",
        os, chrome_ver, version
    )
}

/// 隨機產生一組桌面瀏覽器的 User-Agent
pub fn gen_random_ua() -> String {
    let mut rng = rand::rng();
    match rng.random_range(0..10) {
        0..=5 => gen_chrome_ua(),
        6..=7 => gen_edge_ua(),
        _ => gen_firefox_ua(),
    }
}
