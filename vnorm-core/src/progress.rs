//! Monotonic progress reporting toward the host callback.

use parking_lot::Mutex;

use crate::options::ProgressCallback;

/// Identifies the file and variant a progress sample belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTag {
  pub file_id: String,
  pub variant_id: String,
}

/// Fans progress samples out to the configured callback, clamped to [0, 1]
/// and never decreasing within one processing call.
pub(crate) struct ProgressReporter {
  callback: Option<ProgressCallback>,
  tag: ProgressTag,
  last: Mutex<f64>,
}

impl ProgressReporter {
  pub fn new(callback: Option<ProgressCallback>, tag: ProgressTag) -> ProgressReporter {
    ProgressReporter {
      callback,
      tag,
      last: Mutex::new(0.0),
    }
  }

  /// Reports an absolute fraction of the whole operation.
  pub fn report(&self, fraction: f64) {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let mut last = self.last.lock();
    if fraction <= *last {
      return;
    }
    *last = fraction;
    if let Some(cb) = &self.callback {
      cb(&self.tag, fraction);
    }
  }

  /// A view reporting fractions of the sub-interval `[start, end]`.
  pub fn range(&self, start: f64, end: f64) -> RangedProgress<'_> {
    RangedProgress {
      reporter: self,
      start,
      span: (end - start).max(0.0),
    }
  }

  /// The highest fraction reported so far.
  pub fn current(&self) -> f64 {
    *self.last.lock()
  }
}

pub(crate) struct RangedProgress<'a> {
  reporter: &'a ProgressReporter,
  start: f64,
  span: f64,
}

impl RangedProgress<'_> {
  /// Reports `fraction` of this sub-interval, in [0, 1].
  pub fn report(&self, fraction: f64) {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    self.reporter.report(self.start + fraction * self.span);
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex as StdMutex};

  use quickcheck_macros::quickcheck;

  use super::*;

  fn collecting_reporter() -> (ProgressReporter, Arc<StdMutex<Vec<f64>>>) {
    let samples = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&samples);
    let reporter = ProgressReporter::new(
      Some(Arc::new(move |_tag: &ProgressTag, f: f64| sink.lock().unwrap().push(f))),
      ProgressTag {
        file_id: "file".into(),
        variant_id: "variant".into(),
      },
    );
    (reporter, samples)
  }

  #[test]
  fn decreasing_samples_are_suppressed() {
    let (reporter, samples) = collecting_reporter();
    reporter.report(0.2);
    reporter.report(0.1);
    reporter.report(0.2);
    reporter.report(0.3);
    assert_eq!(*samples.lock().unwrap(), vec![0.2, 0.3]);
  }

  #[test]
  fn ranged_views_compose() {
    let (reporter, samples) = collecting_reporter();
    {
      let validation = reporter.range(0.0, 0.2);
      validation.report(0.5);
      validation.report(1.0);
    }
    {
      let main = reporter.range(0.3, 0.95);
      main.report(0.0);
      main.report(1.0);
    }
    reporter.report(1.0);
    let samples = samples.lock().unwrap();
    let expected = [0.1, 0.2, 0.3, 0.95, 1.0];
    assert_eq!(samples.len(), expected.len());
    for (got, want) in samples.iter().zip(expected) {
      assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }
  }

  #[quickcheck]
  fn deliveries_are_monotone_and_bounded(raw: Vec<f64>) -> bool {
    let (reporter, samples) = collecting_reporter();
    for f in raw {
      reporter.report(f);
    }
    reporter.report(1.0);
    let samples = samples.lock().unwrap();
    samples.windows(2).all(|w| w[0] < w[1]) && samples.iter().all(|f| (0.0..=1.0).contains(f))
  }
}
