//! Progress line parsing for the external download programs.

/// Parses a human size such as `10.5MiB`, `400.0KiB`, `~3.2GB` or `512B`.
/// Decimal and binary suffixes are both treated as powers of 1024, which is
/// what aria2 and yt-dlp print.
pub fn parse_size(raw: &str) -> Option<u64> {
    let s = raw.trim().trim_start_matches('~');
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "B" | "" => 1,
        "K" | "KB" | "KiB" => 1 << 10,
        "M" | "MB" | "MiB" => 1 << 20,
        "G" | "GB" | "GiB" => 1 << 30,
        "T" | "TB" | "TiB" => 1 << 40,
        _ => return None,
    };
    Some((value * multiplier as f64) as u64)
}

/// Parses an aria2c summary line like
/// `[#2089b0 400.0KiB/33.2MiB(1%) CN:1 DL:115.7KiB ETA:4m51s]`
/// into `(downloaded, total)`.
pub fn parse_aria2_progress(line: &str) -> Option<(u64, u64)> {
    line.split_whitespace().find_map(|token| {
        let token = token.trim_start_matches('[');
        let (done, rest) = token.split_once('/')?;
        let total = rest.split('(').next()?;
        if !rest.contains("%)") {
            return None;
        }
        Some((parse_size(done)?, parse_size(total)?))
    })
}

/// Path from an aria2c notice such as
/// `03/17 12:00:01 [NOTICE] Download complete: /srv/dl/file.iso`.
pub fn parse_aria2_completed(line: &str) -> Option<&str> {
    let (_, path) = line.split_once("Download complete:")?;
    let path = path.trim();
    (!path.is_empty()).then_some(path)
}

/// Parses a yt-dlp `--newline` progress line like
/// `[download]  12.3% of ~10.00MiB at  1.00MiB/s ETA 00:09`
/// into `(downloaded, total)`. Lines for unknown sizes return None.
pub fn parse_ytdlp_progress(line: &str) -> Option<(u64, u64)> {
    let rest = line.trim_start().strip_prefix("[download]")?;
    let mut tokens = rest.split_whitespace();
    let percent: f64 = tokens.next()?.strip_suffix('%')?.parse().ok()?;
    if tokens.next()? != "of" {
        return None;
    }
    let total = parse_size(tokens.next()?)?;
    let done = (total as f64 * percent.clamp(0.0, 100.0) / 100.0) as u64;
    Some((done, total))
}
