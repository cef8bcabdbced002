use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::*;

impl Slot<'_> {
  fn is_main(&self) -> bool {
    matches!(self, Slot::Main(_))
  }
}

#[test]
fn progress_line_parsing() {
  assert_eq!(parse_progress_line("out_time_us=1500000"), Some(1.5));
  assert_eq!(parse_progress_line("out_time_us=0"), Some(0.0));
  assert_eq!(parse_progress_line("out_time=00:00:01.500000"), None);
  assert_eq!(parse_progress_line("progress=end"), None);
  assert_eq!(parse_progress_line("out_time_us=garbage"), None);
  assert_eq!(parse_progress_line(""), None);
}

#[tokio::test]
async fn progress_reader_handles_partial_lines_and_cr() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("progress.txt");
  let mut samples = Vec::new();
  let mut reader = ProgressFileReader::new(&path);

  // nothing yet: the file does not even exist
  reader.poll_once(&mut |s| samples.push(s)).await.unwrap();
  assert!(samples.is_empty());

  std::fs::write(&path, "out_time_us=25").unwrap();
  reader.poll_once(&mut |s| samples.push(s)).await.unwrap();
  assert!(samples.is_empty(), "incomplete line must not be reported");

  use std::io::Write;
  let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
  write!(f, "0000\r\nout_time_us=500000\nprogress=end\n").unwrap();
  drop(f);
  reader.poll_once(&mut |s| samples.push(s)).await.unwrap();
  assert_eq!(samples, vec![0.25, 0.5]);
}

#[tokio::test]
async fn main_pool_preferred_over_fast_lane() {
  let pool = ProcessPool::new(2);
  let slot = pool.acquire(true).await;
  assert!(slot.is_main(), "short-lived work uses the main pool when free");
}

#[tokio::test]
async fn fast_lane_available_when_main_saturated() {
  let pool = ProcessPool::new(1);
  let _long = pool.acquire(false).await;
  let probe = pool.acquire(true).await;
  assert!(!probe.is_main(), "probe must take the fast lane without waiting");
}

#[tokio::test]
async fn fast_lane_waiter_upgrades_to_main_pool() {
  let pool = Arc::new(ProcessPool::new(1));
  let long = pool.acquire(false).await;
  let fast_holder = pool.acquire(true).await;
  assert!(!fast_holder.is_main());

  let waiter = {
    let pool = Arc::clone(&pool);
    tokio::spawn(async move {
      let slot = pool.acquire(true).await;
      let upgraded = slot.is_main();
      drop(slot);
      upgraded
    })
  };
  // let the waiter park on the fast lane before freeing anything
  tokio::time::sleep(Duration::from_millis(20)).await;

  drop(long);
  drop(fast_holder);
  let upgraded = waiter.await.unwrap();
  assert!(upgraded, "a freed main slot must be taken over the fast lane");
  assert_eq!(pool.fast.available_permits(), 1);
  assert_eq!(pool.main.available_permits(), 1);
}

#[cfg(unix)]
mod subprocess {
  use super::*;
  use std::path::PathBuf;

  fn sh() -> PathBuf {
    PathBuf::from("/bin/sh")
  }

  fn argv(script: &str) -> Vec<String> {
    vec!["-c".into(), script.into()]
  }

  #[tokio::test]
  async fn run_to_strings_captures_both_pipes_and_exit_code() {
    let pool = ProcessPool::new(2);
    let cancel = CancellationToken::new();
    let out = pool
      .run_to_strings(&sh(), &argv("printf out; printf err 1>&2; exit 3"), true, &cancel)
      .await
      .unwrap();
    assert_eq!(out.stdout, "out");
    assert_eq!(out.stderr, "err");
    assert_eq!(out.exit_code, Some(3));
    assert!(!out.success());
  }

  #[tokio::test]
  async fn run_with_error_reports_argv_and_stderr() {
    let pool = ProcessPool::new(2);
    let cancel = CancellationToken::new();
    let err = pool
      .run_with_error::<tokio::fs::File>(&sh(), &argv("echo boom 1>&2; exit 2"), None, true, &cancel)
      .await
      .unwrap_err();
    match err {
      Error::Toolchain { exit_code, stderr, args, .. } => {
        assert_eq!(exit_code, Some(2));
        assert!(stderr.contains("boom"));
        assert_eq!(args[0], "-c");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn run_with_error_streams_stdout_into_sink() {
    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("sink.bin");
    let pool = ProcessPool::new(2);
    let cancel = CancellationToken::new();
    let mut sink = tokio::fs::File::create(&sink_path).await.unwrap();
    pool
      .run_with_error(&sh(), &argv("printf payload"), Some(&mut sink), true, &cancel)
      .await
      .unwrap();
    drop(sink);
    assert_eq!(std::fs::read_to_string(&sink_path).unwrap(), "payload");
  }

  #[tokio::test]
  async fn cancellation_kills_the_child_tree() {
    let pool = ProcessPool::new(2);
    let cancel = CancellationToken::new();
    let start = Instant::now();
    let task = {
      let cancel = cancel.clone();
      async move {
        pool
          .run_to_strings(&sh(), &argv("sleep 30"), false, &cancel)
          .await
      }
    };
    let cancel_after = async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      cancel.cancel();
    };
    let (result, ()) = tokio::join!(task, cancel_after);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(10), "kill must not wait for the child");
  }

  #[tokio::test]
  async fn progress_samples_are_delivered_with_final_drain() {
    let dir = tempfile::tempdir().unwrap();
    let progress = dir.path().join("progress.txt");
    let pool = ProcessPool::new(2);
    let cancel = CancellationToken::new();
    let script = format!(
      "printf 'out_time_us=500000\\nprogress=continue\\nout_time_us=1000000\\nprogress=end\\n' > {}",
      progress.display()
    );
    let mut samples: Vec<f64> = Vec::new();
    pool
      .run_raw_with_progress(&sh(), &argv(&script), &progress, true, &cancel, |s| samples.push(s))
      .await
      .unwrap();
    assert_eq!(samples.last().copied(), Some(1.0), "final sample must be drained");
    assert!(samples.windows(2).all(|w| w[0] <= w[1]));
  }
}
