// Helpers to format sizes in human-readable form
pub fn bytes2hr(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub fn bits2hr(bits: usize) -> String {
    bytes2hr(bits.div_ceil(8))
}

/// Ratio as a percentage with two decimals, `0.0123` -> `"1.23%"`.
pub fn ratio2hr(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}
