//! Download progress snapshots.

use serde::Serialize;

/// Bytes received so far against the announced `Content-Length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub loaded: u64,
    pub total: u64,
    /// `round(loaded / total * 100)`, clamped to 100.
    pub percent: u8,
}

impl DownloadProgress {
    /// Returns `None` when the total is unknown (zero).
    #[must_use]
    pub fn new(loaded: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let total_wide = u128::from(total);
        let scaled = (u128::from(loaded) * 100 + total_wide / 2) / total_wide;
        let percent = u8::try_from(scaled.min(100)).unwrap_or(100);
        Some(Self {
            loaded,
            total,
            percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_total_has_no_progress() {
        assert_eq!(DownloadProgress::new(512, 0), None);
    }

    #[test]
    fn test_percent_rounds_to_nearest() {
        assert_eq!(DownloadProgress::new(1, 3).map(|p| p.percent), Some(33));
        assert_eq!(DownloadProgress::new(2, 3).map(|p| p.percent), Some(67));
        assert_eq!(DownloadProgress::new(1, 200).map(|p| p.percent), Some(1));
        assert_eq!(DownloadProgress::new(0, 10).map(|p| p.percent), Some(0));
        assert_eq!(DownloadProgress::new(10, 10).map(|p| p.percent), Some(100));
    }

    #[test]
    fn test_percent_clamped_when_server_undercounts() {
        let progress = DownloadProgress::new(150, 100);
        assert_eq!(progress.map(|p| p.percent), Some(100));
        assert_eq!(progress.map(|p| p.loaded), Some(150));
    }
}
