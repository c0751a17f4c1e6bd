use crate::error::{MixError, Result};
use chrono::{Local, NaiveDate};
use regex::Regex;
use std::path::{Path, PathBuf};

/// `[prefix_]YYYY-MM-DD_NN.mp4` with NN one higher than the largest number
/// already used for `date` in `dir`. Missing directories count as empty.
pub fn next_output_path(dir: &Path, date: NaiveDate, prefix: Option<&str>) -> Result<PathBuf> {
    let stem = match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}", prefix, date.format("%Y-%m-%d")),
        None => date.format("%Y-%m-%d").to_string(),
    };
    let pattern = format!(r"^{}_(\d+)\.mp4$", regex::escape(&stem));
    let re = Regex::new(&pattern).map_err(|e| MixError::Config(e.to_string()))?;

    let mut highest = 0u32;
    if dir.exists() {
        for entry in std::fs::read_dir(dir).map_err(|e| MixError::io(dir, e))? {
            let entry = entry.map_err(|e| MixError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = re.captures(&name) else {
                continue;
            };
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                highest = highest.max(n);
            }
        }
    }

    let next = highest.checked_add(1).ok_or_else(|| {
        MixError::Config(format!(
            "no output number left for {} in {}",
            stem,
            dir.display()
        ))
    })?;
    Ok(dir.join(format!("{}_{:02}.mp4", stem, next)))
}

/// [`next_output_path`] for today's local date
pub fn daily_output_path(dir: &Path, prefix: Option<&str>) -> Result<PathBuf> {
    next_output_path(dir, Local::now().date_naive(), prefix)
}
