//! Fixed-width text field helpers for the EDF header

/// 按 Latin-1 解码定宽字段并去掉填充空格
pub fn latin1_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix('+').or_else(|| s.strip_prefix('-')).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parses a positive integer field, `None` when absent, malformed or <= 0
pub fn parse_positive_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if !is_integer_number(s) {
        return None;
    }
    s.parse::<i64>().ok().filter(|&v| v > 0)
}

/// Parses an integer field, `None` when absent or malformed
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if !is_integer_number(s) {
        return None;
    }
    s.parse::<i64>().ok()
}

/// 非本地化的浮点数解析，失败或非有限值时返回 `None`
pub fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Encodes text as Latin-1; characters outside it become `_`
pub fn to_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u32 as u8 } else { b'_' })
        .collect()
}

/// Writes `value` into `field`, left-justified, truncated to the field width,
/// and padded with spaces
pub fn write_padded(field: &mut [u8], value: &str) {
    let encoded = to_latin1(value);
    let len = encoded.len().min(field.len());
    field[..len].copy_from_slice(&encoded[..len]);
    for b in &mut field[len..] {
        *b = b' ';
    }
}

/// Strips trailing ASCII digits from a channel label ("F3" -> "F")
pub fn strip_trailing_digits(label: &str) -> &str {
    label.trim_end_matches(|c: char| c.is_ascii_digit())
}
