//! Grade scale: six point bands derived from the total by fixed cumulative
//! percentages.
//!
//! With boundaries `b_k = round(T * p_k)` (half-up):
//!   grade 1 = [b_1, T], grade k = [b_k, b_(k-1) - 1] for k in 2..=5,
//!   grade 6 = [0, b_5 - 1].
//! For small totals some bands come out inverted; those grades are unreachable
//! and carry no range.

/// Inclusive point range for one grade, or `None` when the grade is unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GradeBand {
  pub grade: u8,
  pub range: Option<(u32, u32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradeScale {
  pub total: u32,
  pub bands: [GradeBand; 6],
}

/// `round(total * percent / 100)` with halves rounded up, in exact integer arithmetic.
fn boundary(total: u32, percent: u32) -> i64 {
  (i64::from(total) * i64::from(percent) + 50) / 100
}

impl GradeScale {
  /// `thresholds` are the cumulative percentages for grades 1..=5, strictly decreasing.
  pub fn compute(total: u32, thresholds: [u32; 5]) -> Self {
    let b = thresholds.map(|p| boundary(total, p));
    let band = |grade: u8, lo: i64, hi: i64| GradeBand {
      grade,
      range: (lo <= hi).then(|| (lo as u32, hi as u32)),
    };
    let bands = [
      band(1, b[0], i64::from(total)),
      band(2, b[1], b[0] - 1),
      band(3, b[2], b[1] - 1),
      band(4, b[3], b[2] - 1),
      band(5, b[4], b[3] - 1),
      band(6, 0, b[4] - 1),
    ];
    Self { total, bands }
  }
}
