/// Normalize a key serial into the form a controller stores as `uid`
///
/// # Arguments
/// * `raw` - The serial as typed into the roster. Accepted forms are a plain
///   hex or decimal serial (optionally `0x`-prefixed) and the Wiegand
///   `facility:card` notation printed on many fobs.
///
/// # Returns
/// * `Result<String, String>` - The canonical serial, or a description of why
///   the input is unusable
pub fn normalize_key_serial(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("key serial is empty".to_string());
    }

    if trimmed.contains(':') {
        return wiegand_to_decimal(trimmed);
    }

    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(format!("key serial '{}' has no digits", trimmed));
    }

    Ok(digits.to_ascii_lowercase())
}

/// Convert `facility:card` (each half a 16-bit number) into the single
/// decimal number the reader reports
fn wiegand_to_decimal(serial: &str) -> Result<String, String> {
    let (facility, card) = serial
        .split_once(':')
        .ok_or_else(|| format!("invalid facility:card serial '{}'", serial))?;

    let facility: u16 = facility
        .trim()
        .parse()
        .map_err(|_| format!("invalid facility code in '{}'", serial))?;
    let card: u16 = card
        .trim()
        .parse()
        .map_err(|_| format!("invalid card number in '{}'", serial))?;

    Ok(((u32::from(facility) << 16) | u32::from(card)).to_string())
}
