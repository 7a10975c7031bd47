//! Human-readable byte sizes.

const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Format a byte count using binary units with one decimal place.
///
/// Sizes below 1024 are printed as whole bytes (`512 B`); anything larger uses
/// the biggest unit whose magnitude is at least 1 (`1.5 KB`, `3.0 GB`).
pub fn human_readable_size(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}
