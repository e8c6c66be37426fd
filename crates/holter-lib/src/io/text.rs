use anyhow::{Context, Result};
use std::path::Path;

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|f| !f.is_empty())
}

/// Parse one numeric column from delimited text.
///
/// Fields may be separated by commas, semicolons, tabs or spaces. Blank lines
/// and `#` comments are skipped, and a first row that does not parse is
/// treated as a header.
pub fn parse_column(text: &str, column: usize) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    let mut seen_row = false;
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let first_row = !seen_row;
        seen_row = true;
        let field = split_fields(trimmed).nth(column);
        let parsed = field.map(str::parse::<f64>);
        match parsed {
            Some(Ok(val)) => out.push(val),
            _ if first_row => continue,
            Some(Err(_)) => {
                anyhow::bail!(
                    "line {} column {} is not f64: {}",
                    idx + 1,
                    column,
                    trimmed
                )
            }
            None => anyhow::bail!("line {} has no column {}: {}", idx + 1, column, trimmed),
        }
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found in column {}", column);
    }
    Ok(out)
}

/// Read one column of a delimited text file.
pub fn read_column(path: &Path, column: usize) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_column(&text, column).with_context(|| format!("parsing {}", path.display()))
}

/// Parse newline-delimited sample indices, e.g. R-peak annotations.
pub fn parse_event_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: usize = trimmed
            .parse()
            .with_context(|| format!("line {} is not an integer index: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no annotation indices found");
    }
    Ok(out)
}

/// Read event indices from a file.
pub fn read_event_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_indices(&text).with_context(|| format!("parsing {}", path.display()))
}
