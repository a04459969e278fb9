//! Shannon entropy over byte histograms.

/// Entropy of `data` in bits per byte (0.0 to 8.0).
pub fn shannon(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    let mut h = 0.0;
    for &c in counts.iter().filter(|&&c| c > 0) {
        let p = c as f64 / len;
        h -= p * p.log2();
    }
    h
}

/// Round to two decimals, the precision stored on targets and sections.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
