//! Sample filters for the tick path: the outlier-rejecting truncated mean
//! used on ADC oversample windows and the running median used by the speed
//! estimator. Both are integer-only and allocation-free; the median sorts
//! its small fixed window on demand.

use crate::fix16::Fix16;

/// Largest oversample window the truncated mean accepts.
pub const TRUNCATED_MEAN_MAX: usize = 16;

/// Outlier-rejecting mean of a small window of unsigned samples.
///
/// Two passes: first the plain mean and variance, then the mean of only
/// those samples whose squared distance from the mean is below
/// `window^2 * variance` (`window` is Q16.16, expected in `[1, 2]`). When
/// every sample is rejected the plain mean is returned, so the result
/// always lies within `[min(src), max(src)]`.
pub fn truncated_mean(src: &[u16], window: Fix16) -> u16 {
    let n = src.len();
    debug_assert!(n <= TRUNCATED_MEAN_MAX, "oversample window too large");
    match n {
        0 => return 0,
        1 => return src[0],
        _ => {}
    }
    let n32 = n as u32;

    let mut sum: u32 = 0;
    let mut sum_sq: u64 = 0;
    for &s in src {
        sum += u32::from(s);
        sum_sq += u64::from(s) * u64::from(s);
    }
    let mean = (sum + n32 / 2) / n32;

    // sum_sq - sum^2/n can go slightly negative through integer division;
    // treat that as zero spread.
    let sq_of_sum = u64::from(sum) * u64::from(sum) / u64::from(n32);
    let variance = sum_sq.saturating_sub(sq_of_sum) / (n as u64 - 1);

    // window^2 in raw Q16.16, then the comparison threshold as a plain
    // integer: (w_raw^2 >> 16) * variance >> 16. The window is at most 2,
    // so w_raw^2 fits in 34 bits and the schedule cannot overflow u64.
    let w_raw = window.raw().max(0) as u64;
    let w_sq = (w_raw * w_raw) >> 16;
    let threshold = (w_sq * variance) >> 16;

    let mut kept_sum: u32 = 0;
    let mut kept: u32 = 0;
    for &s in src {
        let diff = i64::from(s) - i64::from(mean);
        if ((diff * diff) as u64) < threshold {
            kept_sum += u32::from(s);
            kept += 1;
        }
    }
    if kept == 0 {
        return mean as u16;
    }
    ((kept_sum + kept / 2) / kept) as u16
}

/// Window length of the speed median filter.
pub const MEDIAN_WINDOW: usize = 32;

/// Running median over up to [`MEDIAN_WINDOW`] samples.
///
/// `add` overwrites the oldest sample once the window is full; `result`
/// tolerates a partially filled window (a mid-period reset leaves fewer
/// samples than the capacity). Empty windows yield zero.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    buf: [Fix16; MEDIAN_WINDOW],
    len: usize,
    head: usize,
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MedianFilter {
    pub fn new() -> Self {
        Self {
            buf: [Fix16::ZERO; MEDIAN_WINDOW],
            len: 0,
            head: 0,
        }
    }

    pub fn add(&mut self, x: Fix16) {
        self.buf[self.head] = x;
        self.head = (self.head + 1) % MEDIAN_WINDOW;
        if self.len < MEDIAN_WINDOW {
            self.len += 1;
        }
    }

    /// Median of the current window; the mean of the two middle samples
    /// for even counts.
    pub fn result(&self) -> Fix16 {
        if self.len == 0 {
            return Fix16::ZERO;
        }
        let mut tmp = [Fix16::ZERO; MEDIAN_WINDOW];
        tmp[..self.len].copy_from_slice(&self.buf[..self.len]);
        let window = &mut tmp[..self.len];
        window.sort_unstable();
        let mid = self.len / 2;
        if self.len % 2 == 1 {
            window[mid]
        } else {
            let s = window[mid - 1].raw() as i64 + window[mid].raw() as i64;
            Fix16::from_raw((s / 2) as i32)
        }
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn w(x: f32) -> Fix16 {
        Fix16::from_f32(x)
    }

    #[test]
    fn identical_samples_fall_back_to_plain_mean() {
        // Zero variance rejects every sample; the unfiltered mean is used.
        let src = [2048u16; 8];
        assert_eq!(truncated_mean(&src, w(1.1)), 2048);
    }

    #[test]
    fn single_outlier_is_rejected() {
        let src = [100, 100, 100, 100, 100, 100, 100, 4000];
        let m = truncated_mean(&src, w(1.1));
        assert_eq!(m, 100);
    }

    #[test]
    fn symmetric_clusters_keep_the_plain_mean() {
        let src = [0, 0, 0, 0, 4000, 4000, 4000, 4000];
        let m = truncated_mean(&src, w(1.0));
        assert_eq!(m, 2000);
    }

    #[rstest]
    #[case(&[7])]
    #[case(&[1, 2])]
    #[case(&[0, 4095, 17, 17, 17])]
    fn stays_within_input_range(#[case] src: &[u16]) {
        let m = truncated_mean(src, w(1.1));
        let lo = *src.iter().min().unwrap();
        let hi = *src.iter().max().unwrap();
        assert!(m >= lo && m <= hi, "{m} outside [{lo}, {hi}]");
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(truncated_mean(&[], w(1.1)), 0);
    }

    #[test]
    fn median_odd_window() {
        let mut f = MedianFilter::new();
        for v in [5.0, 1.0, 9.0] {
            f.add(w(v));
        }
        assert_eq!(f.result(), w(5.0));
    }

    #[test]
    fn median_even_window_averages_middles() {
        let mut f = MedianFilter::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            f.add(w(v));
        }
        assert_eq!(f.result(), w(2.5));
    }

    #[test]
    fn median_overwrites_oldest_when_full() {
        let mut f = MedianFilter::new();
        for _ in 0..MEDIAN_WINDOW {
            f.add(w(1.0));
        }
        for _ in 0..MEDIAN_WINDOW {
            f.add(w(3.0));
        }
        assert_eq!(f.result(), w(3.0));
        assert_eq!(f.len(), MEDIAN_WINDOW);
    }

    #[test]
    fn median_reset_then_partial_window() {
        let mut f = MedianFilter::new();
        for v in [1.0, 2.0, 3.0] {
            f.add(w(v));
        }
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.result(), Fix16::ZERO);
        f.add(w(7.0));
        assert_eq!(f.result(), w(7.0));
    }
}
