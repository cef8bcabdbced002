//! Global, bounded-concurrency runner for toolchain subprocesses.
//!
//! Two semaphores serialize access to the toolchain: a main pool sized by
//! the configured parallelism, and a one-slot fast lane reserved for
//! short-lived probe work so a saturated pool of transcodes cannot starve
//! probes. Cancellation translates into a kill of the child's whole process
//! tree, since the toolchain routinely spawns helpers.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Pooled read buffer size for pipe redirection.
const IO_BUF_SIZE: usize = 8 * 1024;

/// How often the progress-file poller looks for new bytes.
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Captured output of a finished toolchain process.
#[derive(Debug)]
pub struct ProcessOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: Option<i32>,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

enum Slot<'a> {
  Main(#[allow(dead_code)] SemaphorePermit<'a>),
  Fast(#[allow(dead_code)] SemaphorePermit<'a>),
}

/// Process-wide supervisor for toolchain subprocesses.
#[derive(Debug)]
pub struct ProcessPool {
  main: Semaphore,
  fast: Semaphore,
  capacity: usize,
}

impl ProcessPool {
  pub fn new(max_concurrent: usize) -> ProcessPool {
    ProcessPool {
      main: Semaphore::new(max_concurrent),
      fast: Semaphore::new(1),
      capacity: max_concurrent,
    }
  }

  /// Configured main-pool capacity (the fast lane adds one more slot).
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Acquires a run slot.
  ///
  /// Order: main pool without waiting, then (for short-lived work) the fast
  /// lane without waiting, then a blocking wait on the appropriate lane. A
  /// task that waited on the fast lane upgrades to the main pool when a main
  /// slot has freed up in the meantime, releasing the fast slot for probes.
  async fn acquire(&self, short_lived: bool) -> Slot<'_> {
    if let Ok(permit) = self.main.try_acquire() {
      return Slot::Main(permit);
    }
    if short_lived {
      if let Ok(permit) = self.fast.try_acquire() {
        return Slot::Fast(permit);
      }
      let fast = self.fast.acquire().await.expect("fast lane semaphore closed");
      if let Ok(main) = self.main.try_acquire() {
        drop(fast);
        return Slot::Main(main);
      }
      return Slot::Fast(fast);
    }
    let permit = self.main.acquire().await.expect("main pool semaphore closed");
    Slot::Main(permit)
  }

  /// Runs a process to completion, capturing stdout and stderr as strings.
  /// Non-zero exits are reported through [`ProcessOutput::exit_code`], not
  /// as errors.
  pub async fn run_to_strings(
    &self,
    program: &Path,
    args: &[String],
    short_lived: bool,
    cancel: &CancellationToken,
  ) -> Result<ProcessOutput> {
    let _slot = self.acquire(short_lived).await;
    let mut child = spawn(program, args)?;
    let pid = child.id();
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let outcome = {
      let work = async {
        // Read both pipes continually so the child never blocks on a full
        // pipe buffer, then reap it.
        let (out, err) = tokio::join!(drain_to_string(&mut stdout), drain_to_string(&mut stderr));
        let status = child.wait().await?;
        Ok::<_, Error>(ProcessOutput {
          stdout: out?,
          stderr: err?,
          exit_code: status.code(),
        })
      };
      tokio::select! {
        res = work => Some(res),
        _ = cancel.cancelled() => None,
      }
    };

    match outcome {
      Some(result) => result,
      None => {
        if let Some(pid) = pid {
          kill_process_tree(pid);
        }
        let _ = child.wait().await;
        Err(Error::Cancelled)
      }
    }
  }

  /// Runs a process, streaming its stdout into `stdout_sink` when one is
  /// given, and fails with a [`Error::Toolchain`] on a non-zero exit.
  pub async fn run_with_error<W>(
    &self,
    program: &Path,
    args: &[String],
    mut stdout_sink: Option<&mut W>,
    short_lived: bool,
    cancel: &CancellationToken,
  ) -> Result<()>
  where
    W: AsyncWrite + Unpin + Send,
  {
    let _slot = self.acquire(short_lived).await;
    let mut child = spawn(program, args)?;
    let pid = child.id();
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let outcome = {
      let work = async {
        let sink = stdout_sink.take();
        let stdout_fut = async {
          match sink {
            Some(sink) => {
              copy_flushing(&mut stdout, sink).await?;
              Ok(String::new())
            }
            None => drain_to_string(&mut stdout).await,
          }
        };
        let (out, err) = tokio::join!(stdout_fut, drain_to_string(&mut stderr));
        let status = child.wait().await?;
        Ok::<_, Error>((out?, err?, status))
      };
      tokio::select! {
        res = work => Some(res),
        _ = cancel.cancelled() => None,
      }
    };

    match outcome {
      Some(result) => {
        let (stdout, stderr, status) = result?;
        if status.success() {
          Ok(())
        } else {
          Err(Error::Toolchain {
            program: program.display().to_string(),
            args: args.to_vec(),
            exit_code: status.code(),
            stderr,
            stdout: Some(stdout).filter(|s| !s.is_empty()),
          })
        }
      }
      None => {
        if let Some(pid) = pid {
          kill_process_tree(pid);
        }
        let _ = child.wait().await;
        Err(Error::Cancelled)
      }
    }
  }

  /// Runs a transcode whose argv directs incremental progress into
  /// `progress_file`, polling that file concurrently and reporting each
  /// `out_time_us=` sample (converted to seconds) through `on_progress`.
  ///
  /// With `ensure_all_read`, one final drain runs after the child exits so
  /// the last progress sample is always delivered.
  pub async fn run_raw_with_progress<F>(
    &self,
    program: &Path,
    args: &[String],
    progress_file: &Path,
    ensure_all_read: bool,
    cancel: &CancellationToken,
    mut on_progress: F,
  ) -> Result<()>
  where
    F: FnMut(f64),
  {
    let _slot = self.acquire(false).await;
    let mut child = spawn(program, args)?;
    let pid = child.id();
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");
    let mut reader = ProgressFileReader::new(progress_file);

    let outcome = {
      let work = async {
        let (out, err) = tokio::join!(drain_to_string(&mut stdout), drain_to_string(&mut stderr));
        let status = child.wait().await?;
        Ok::<_, Error>((out?, err?, status))
      };
      // Never completes on its own; it only leaves the select by error.
      let poll_loop = async {
        loop {
          if let Err(e) = reader.poll_once(&mut on_progress).await {
            return e;
          }
          tokio::time::sleep(PROGRESS_POLL_INTERVAL).await;
        }
      };
      tokio::select! {
        res = work => Some(res),
        err = poll_loop => Some(Err(err)),
        _ = cancel.cancelled() => None,
      }
    };

    match outcome {
      Some(result) => {
        let (stdout, stderr, status) = result?;
        if ensure_all_read {
          reader.poll_once(&mut on_progress).await?;
        }
        if status.success() {
          Ok(())
        } else {
          Err(Error::Toolchain {
            program: program.display().to_string(),
            args: args.to_vec(),
            exit_code: status.code(),
            stderr,
            stdout: Some(stdout).filter(|s| !s.is_empty()),
          })
        }
      }
      None => {
        if let Some(pid) = pid {
          kill_process_tree(pid);
        }
        let _ = child.wait().await;
        Err(Error::Cancelled)
      }
    }
  }
}

fn spawn(program: &Path, args: &[String]) -> Result<Child> {
  debug!("spawning {} {}", program.display(), args.join(" "));
  let child = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    // safety net for error paths that drop the handle without reaping
    .kill_on_drop(true)
    .spawn()?;
  Ok(child)
}

async fn drain_to_string<R: AsyncRead + Unpin>(pipe: &mut R) -> Result<String> {
  let mut buf = Vec::with_capacity(IO_BUF_SIZE);
  pipe.read_to_end(&mut buf).await?;
  Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Copies pipe bytes into the sink with a pooled buffer, flushing after each
/// write so a tailing consumer sees output promptly.
async fn copy_flushing<R, W>(pipe: &mut R, sink: &mut W) -> Result<()>
where
  R: AsyncRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let mut buf = vec![0u8; IO_BUF_SIZE];
  loop {
    let n = pipe.read(&mut buf).await?;
    if n == 0 {
      break;
    }
    sink.write_all(&buf[..n]).await?;
    sink.flush().await?;
  }
  Ok(())
}

/// Incremental reader over the toolchain's append-only progress file. The
/// file is opened with shared read once it exists; each poll consumes the
/// newly appended bytes and reports complete `out_time_us=` lines.
struct ProgressFileReader {
  path: PathBuf,
  file: Option<tokio::fs::File>,
  pending: Vec<u8>,
}

impl ProgressFileReader {
  fn new(path: &Path) -> ProgressFileReader {
    ProgressFileReader {
      path: path.to_path_buf(),
      file: None,
      pending: Vec::new(),
    }
  }

  async fn poll_once<F: FnMut(f64)>(&mut self, on_progress: &mut F) -> Result<()> {
    if self.file.is_none() {
      match tokio::fs::File::open(&self.path).await {
        Ok(f) => self.file = Some(f),
        // the child has not created the file yet
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
      }
    }
    let file = self.file.as_mut().expect("progress file opened above");
    let mut buf = vec![0u8; IO_BUF_SIZE];
    loop {
      let n = file.read(&mut buf).await?;
      if n == 0 {
        break;
      }
      self.pending.extend_from_slice(&buf[..n]);
    }
    while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      let line = String::from_utf8_lossy(&line[..line.len() - 1]);
      if let Some(seconds) = parse_progress_line(line.trim_end_matches('\r')) {
        trace!("progress sample: {seconds:.3}s");
        on_progress(seconds);
      }
    }
    Ok(())
  }
}

/// Extracts the elapsed seconds from one progress line. Only `out_time_us=`
/// lines carry a sample; everything else is ignored.
pub(crate) fn parse_progress_line(line: &str) -> Option<f64> {
  let value = line.strip_prefix("out_time_us=")?.trim();
  let micros = value.parse::<i64>().ok()?;
  Some(micros as f64 / 1_000_000.0)
}

/// Kills `pid` and every descendant. Errors are swallowed: the processes may
/// have exited concurrently.
pub(crate) fn kill_process_tree(pid: u32) {
  let mut system = sysinfo::System::new();
  system.refresh_processes();
  let root = sysinfo::Pid::from_u32(pid);
  let mut victims = vec![root];
  let mut frontier = vec![root];
  while let Some(parent) = frontier.pop() {
    for (child_pid, process) in system.processes() {
      if process.parent() == Some(parent) && !victims.contains(child_pid) {
        victims.push(*child_pid);
        frontier.push(*child_pid);
      }
    }
  }
  // children first, then the root
  for victim in victims.iter().rev() {
    if let Some(process) = system.process(*victim) {
      process.kill();
    }
  }
  debug!("killed process tree rooted at {pid} ({} processes)", victims.len());
}
