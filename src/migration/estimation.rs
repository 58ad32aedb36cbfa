// ABOUTME: Size accounting for an export run and human-readable byte formatting
// ABOUTME: Feeds manifest size_human fields and the end-of-export summary

/// Byte totals for one export run, split by distribution channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeSummary {
    pub lookup_bytes: u64,
    pub large_bytes: u64,
    /// Size of the source database file
    pub source_bytes: u64,
}

impl SizeSummary {
    pub fn total_bytes(&self) -> u64 {
        self.lookup_bytes + self.large_bytes
    }

    /// Percentage of the source size saved by the Parquet distribution
    ///
    /// Negative when the distribution is larger than the source; `None` for an
    /// empty source file.
    pub fn space_saving_percent(&self) -> Option<f64> {
        if self.source_bytes == 0 {
            return None;
        }
        Some((1.0 - self.total_bytes() as f64 / self.source_bytes as f64) * 100.0)
    }

    pub fn log(&self) {
        tracing::info!("=== Export Summary ===");
        tracing::info!("  Total Parquet size : {}", format_bytes(self.total_bytes()));
        tracing::info!("  Lookups (in repo)  : {}", format_bytes(self.lookup_bytes));
        tracing::info!("  Release assets     : {}", format_bytes(self.large_bytes));
        tracing::info!("  Source database    : {}", format_bytes(self.source_bytes));
        if let Some(saving) = self.space_saving_percent() {
            tracing::info!("  Space saving       : {:.0}%", saving);
        }
    }
}

/// Format bytes into human-readable string
///
/// Converts byte count into appropriate units (B, KB, MB, GB, TB)
/// with one decimal place of precision.
///
/// # Examples
///
/// ```
/// # use sqlite_dist::migration::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1073741824), "1.0 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(500), "500.0 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(16106127360), "15.0 GB");
        assert_eq!(format_bytes(1099511627776), "1.0 TB");
    }

    #[test]
    fn test_space_saving() {
        let summary = SizeSummary {
            lookup_bytes: 100,
            large_bytes: 150,
            source_bytes: 1000,
        };
        assert_eq!(summary.total_bytes(), 250);
        assert_eq!(summary.space_saving_percent(), Some(75.0));

        let empty = SizeSummary::default();
        assert_eq!(empty.space_saving_percent(), None);
    }
}
