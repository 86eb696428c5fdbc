//! # Id Ranges
//!
//! Summary of `MIN(id), MAX(id), COUNT(*)` over a filter, and the windows a
//! batch job walks instead of paging with `OFFSET`.
//!
//! ```text
//! GetRange(filter) ──► IdRange { min: 101, max: 1050, count: 812 }
//!                          │
//!                          ▼ windows(400)
//!               [101..=500] [501..=900] [901..=1050]
//!                          │
//!                          ▼
//!        SELECT ... WHERE <filter> AND id BETWEEN ? AND ?
//! ```

use serde::{Deserialize, Serialize};

/// Aggregate over the ids matching a filter. `count == 0` means empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
    pub count: i64,
}

/// Inclusive id window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdWindow {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Splits `[min, max]` into consecutive windows of at most `size` ids.
    ///
    /// Windows are sized by id span, not by row count; sparse ranges produce
    /// windows with fewer rows. A `size` below 1 is treated as 1.
    ///
    /// ```rust
    /// use bistro_core::range::{IdRange, IdWindow};
    ///
    /// let range = IdRange { min: 1, max: 10, count: 10 };
    /// let windows: Vec<IdWindow> = range.windows(4).collect();
    /// assert_eq!(windows.len(), 3);
    /// assert_eq!(windows[2], IdWindow { start: 9, end: 10 });
    ///
    /// assert_eq!(IdRange::default().windows(4).count(), 0);
    /// ```
    pub fn windows(&self, size: i64) -> Windows {
        Windows {
            next: if self.is_empty() { None } else { Some(self.min) },
            max: self.max,
            size: size.max(1),
        }
    }
}

/// Iterator returned by [`IdRange::windows`].
#[derive(Debug, Clone)]
pub struct Windows {
    next: Option<i64>,
    max: i64,
    size: i64,
}

impl Iterator for Windows {
    type Item = IdWindow;

    fn next(&mut self) -> Option<IdWindow> {
        let start = self.next?;
        if start > self.max {
            self.next = None;
            return None;
        }

        let end = start.saturating_add(self.size - 1).min(self.max);
        self.next = if end >= self.max { None } else { Some(end + 1) };

        Some(IdWindow { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_cover_range_exactly() {
        let range = IdRange {
            min: 101,
            max: 1050,
            count: 812,
        };
        let windows: Vec<_> = range.windows(400).collect();

        assert_eq!(
            windows,
            vec![
                IdWindow { start: 101, end: 500 },
                IdWindow { start: 501, end: 900 },
                IdWindow { start: 901, end: 1050 },
            ]
        );
    }

    #[test]
    fn test_single_row_range() {
        let range = IdRange {
            min: 7,
            max: 7,
            count: 1,
        };
        let windows: Vec<_> = range.windows(100).collect();
        assert_eq!(windows, vec![IdWindow { start: 7, end: 7 }]);
    }

    #[test]
    fn test_degenerate_size() {
        let range = IdRange {
            min: 1,
            max: 3,
            count: 3,
        };
        assert_eq!(range.windows(0).count(), 3);
    }

    #[test]
    fn test_near_i64_max() {
        let range = IdRange {
            min: i64::MAX - 1,
            max: i64::MAX,
            count: 2,
        };
        let windows: Vec<_> = range.windows(10).collect();
        assert_eq!(
            windows,
            vec![IdWindow {
                start: i64::MAX - 1,
                end: i64::MAX
            }]
        );
    }
}
