use anyhow::{Context, Result};
use std::path::Path;

/// Decode little-endian signed 16-bit samples.
pub fn parse_i16_samples(buf: &[u8]) -> Result<Vec<f64>> {
    if buf.is_empty() {
        anyhow::bail!("binary recording was empty");
    }
    if buf.len() % 2 != 0 {
        anyhow::bail!(
            "binary recording has {} bytes, not a whole number of 16-bit samples",
            buf.len()
        );
    }
    Ok(buf
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64)
        .collect())
}

/// Read a raw `.bin` recording of int16 samples.
pub fn read_bin(path: &Path) -> Result<Vec<f64>> {
    let is_bin = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bin"));
    if !is_bin {
        anyhow::bail!("{} was not a binary file", path.display());
    }
    let buf = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_i16_samples(&buf).with_context(|| format!("decoding {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_samples() {
        let mut bytes = Vec::new();
        for v in [0i16, 1, -1, 1200, i16::MIN] {
            bytes.extend(v.to_le_bytes());
        }
        let samples = parse_i16_samples(&bytes).unwrap();
        assert_eq!(samples, vec![0.0, 1.0, -1.0, 1200.0, -32768.0]);
    }

    #[test]
    fn rejects_empty_and_odd_buffers() {
        assert!(parse_i16_samples(&[]).is_err());
        assert!(parse_i16_samples(&[1, 2, 3]).is_err());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecg.bin");
        std::fs::write(&path, [0x10, 0x00, 0xF0, 0xFF]).unwrap();
        assert_eq!(read_bin(&path).unwrap(), vec![16.0, -16.0]);
        let wrong = dir.path().join("ecg.dat");
        std::fs::write(&wrong, [0u8, 0]).unwrap();
        assert!(read_bin(&wrong).is_err());
    }
}
