//! End-to-end tests against a scripted stand-in toolchain: shell scripts
//! that answer probe queries with canned JSON and listings, and "transcode"
//! by writing marker bytes, logging every invocation for assertions.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use vnorm_core::{
  configure_with_toolchain, extract_thumbnail, process, ProcessingOptions, ThumbnailOptions,
  WorkDirContext,
};

const PROBE_JSON_MKV: &str = r#"{
  "streams": [
    {
      "codec_type": "video", "codec_name": "h264", "profile": "High",
      "width": 1280, "height": 720, "r_frame_rate": "30/1",
      "sample_aspect_ratio": "1:1", "pix_fmt": "yuv420p",
      "duration": "30.0", "disposition": { "default": 1 }
    },
    {
      "codec_type": "audio", "codec_name": "aac", "profile": "LC",
      "channels": 2, "sample_rate": "48000", "duration": "30.0",
      "disposition": { "default": 1 }
    }
  ],
  "format": { "format_name": "matroska,webm", "duration": "30.0" }
}"#;

const PROBE_JSON_MP4: &str = r#"{
  "streams": [
    {
      "codec_type": "video", "codec_name": "h264", "profile": "High",
      "width": 1280, "height": 720, "r_frame_rate": "30/1",
      "sample_aspect_ratio": "1:1", "pix_fmt": "yuv420p",
      "duration": "30.0", "disposition": { "default": 1 }
    },
    {
      "codec_type": "audio", "codec_name": "aac", "profile": "LC",
      "channels": 2, "sample_rate": "48000", "duration": "30.0",
      "disposition": { "default": 1 }
    }
  ],
  "format": { "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "30.0" }
}"#;

const ENCODER_LISTING: &str = " ------
 V..... libx264   H.264
 V..... libx265   H.265
 V..... png       PNG
 A..... aac       AAC
 A..... libfdk_aac FDK AAC
 S..... mov_text  3GPP Timed Text
";

const CODEC_LISTING: &str = " -------
 DEV.L. h264      H.264
 DEV.L. hevc      H.265
 DEA.L. aac       AAC
 DEA.L. flac      FLAC
";

const MUXER_LISTING: &str = " --
  E mp4      MP4
";

const DEMUXER_LISTING: &str = " --
 D  mov,mp4,m4a,3gp,3g2,mj2 QuickTime
 D  matroska,webm Matroska
 D  avi      AVI
 D  mpegts   MPEG-TS
 D  mpeg     MPEG-PS
";

const FILTER_LISTING: &str = " ... zscale   V->V  zscale
 ... scale    V->V  scale
 ... fps      V->V  fps
 ... tonemap  V->V  tonemap
 ... format   V->V  format
 ... bwdif    V->V  bwdif
 ... setsar   V->V  setsar
";

fn write_script(path: &Path, body: &str) {
  std::fs::write(path, body).unwrap();
  let mut perms = std::fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(path, perms).unwrap();
}

fn write_listing(dir: &Path, name: &str, content: &str) {
  std::fs::write(dir.join(name), content).unwrap();
}

struct MockToolchain {
  dir: PathBuf,
}

impl MockToolchain {
  fn probe_log(&self) -> Vec<String> {
    std::fs::read_to_string(self.dir.join("probe.log"))
      .map(|s| s.lines().map(str::to_owned).collect())
      .unwrap_or_default()
  }

  fn transcoder_log(&self) -> Vec<String> {
    std::fs::read_to_string(self.dir.join("transcoder.log"))
      .map(|s| s.lines().map(str::to_owned).collect())
      .unwrap_or_default()
  }
}

/// Builds the scripted toolchain once per test process and configures the
/// core with it.
fn toolchain() -> &'static MockToolchain {
  static INSTANCE: OnceCell<MockToolchain> = OnceCell::new();
  INSTANCE.get_or_init(|| {
    let dir = std::env::temp_dir().join(format!("vnorm-mock-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    write_listing(&dir, "encoders.txt", ENCODER_LISTING);
    write_listing(&dir, "codecs.txt", CODEC_LISTING);
    write_listing(&dir, "muxers.txt", MUXER_LISTING);
    write_listing(&dir, "demuxers.txt", DEMUXER_LISTING);
    write_listing(&dir, "filters.txt", FILTER_LISTING);
    std::fs::write(dir.join("probe-mkv.json"), PROBE_JSON_MKV).unwrap();
    std::fs::write(dir.join("probe-mp4.json"), PROBE_JSON_MP4).unwrap();

    let here = dir.display();
    write_script(
      &dir.join("ffprobe"),
      &format!(
        r#"#!/bin/sh
case "$*" in
  *-encoders*) cat "{here}/encoders.txt" ;;
  *-codecs*) cat "{here}/codecs.txt" ;;
  *-muxers*) cat "{here}/muxers.txt" ;;
  *-demuxers*) cat "{here}/demuxers.txt" ;;
  *-filters*) cat "{here}/filters.txt" ;;
  *-show_format*)
    echo "$*" >> "{here}/probe.log"
    for last in "$@"; do :; done
    case "$last" in
      *.mp4) cat "{here}/probe-mp4.json" ;;
      *) cat "{here}/probe-mkv.json" ;;
    esac
    ;;
esac
exit 0
"#
      ),
    );
    write_script(
      &dir.join("ffmpeg"),
      &format!(
        r#"#!/bin/sh
echo "$*" >> "{here}/transcoder.log"
progress=""
prev=""
out=""
for a in "$@"; do
  if [ "$prev" = "-progress" ]; then progress="$a"; fi
  prev="$a"
  out="$a"
done
if [ -n "$progress" ]; then
  printf 'out_time_us=15000000\nprogress=continue\nout_time_us=30000000\nprogress=end\n' > "$progress"
fi
if [ "$out" != "-" ]; then printf 'transcoded-bytes' > "$out"; fi
exit 0
"#
      ),
    );

    configure_with_toolchain(&dir, 4).unwrap();
    MockToolchain { dir }
  })
}

fn source_file(dir: &Path, name: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, b"source-bytes").unwrap();
  path
}

/// The invocation-log assertions need the tests serialized.
fn serialize_tests() -> std::sync::MutexGuard<'static, ()> {
  static LOCK: Mutex<()> = Mutex::new(());
  LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[tokio::test]
async fn compliant_mp4_passes_through_untouched() {
  let _guard = serialize_tests();
  let tc = toolchain();
  let work = tempfile::tempdir().unwrap();
  let source = source_file(work.path(), "clip.mp4");
  let ctx = WorkDirContext::new(source.clone(), work.path().join("work"), "primary").unwrap();

  let probes_before = tc.probe_log().len();
  let transcodes_before = tc.transcoder_log().len();

  let result = process(&ctx, &ProcessingOptions::preserve()).await.unwrap();
  assert_eq!(result.path, source);
  assert!(!result.has_changes);
  assert_eq!(tc.probe_log().len(), probes_before + 1, "one probe call");
  assert_eq!(tc.transcoder_log().len(), transcodes_before, "no transcode invocation");
}

#[tokio::test]
async fn mkv_is_remuxed_into_mp4_with_stream_copies() {
  let _guard = serialize_tests();
  let tc = toolchain();
  let work = tempfile::tempdir().unwrap();
  let source = source_file(work.path(), "clip.mkv");
  let ctx = WorkDirContext::new(source, work.path().join("work"), "primary").unwrap();

  let transcodes_before = tc.transcoder_log().len();
  let samples: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&samples);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.progress_callback = Some(Arc::new(move |_tag: &vnorm_core::ProgressTag, f: f64| {
    sink.lock().unwrap().push(f);
  }));

  let result = process(&ctx, &options).await.unwrap();
  assert!(result.has_changes);
  assert_eq!(result.path.extension().unwrap(), "mp4");
  assert_eq!(std::fs::read(&result.path).unwrap(), b"transcoded-bytes");

  let new_calls: Vec<String> = tc.transcoder_log()[transcodes_before..].to_vec();
  assert_eq!(new_calls.len(), 1, "a single remux invocation: {new_calls:?}");
  let call = &new_calls[0];
  assert!(call.contains("-map 0"), "maps every stream: {call}");
  assert!(call.contains("-c:v:0 copy"), "video copied: {call}");
  assert!(call.contains("-c:a:0 copy"), "audio copied: {call}");
  assert!(call.contains("+faststart+use_metadata_tags"), "{call}");

  let samples = samples.lock().unwrap();
  assert_eq!(samples.last().copied(), Some(1.0), "progress reaches 1.0");
  assert!(samples.windows(2).all(|w| w[0] <= w[1]), "monotone: {samples:?}");
}

#[tokio::test]
async fn thumbnail_extraction_produces_a_png_work_file() {
  let _guard = serialize_tests();
  toolchain();
  let work = tempfile::tempdir().unwrap();
  let source = source_file(work.path(), "movie.mkv");
  let ctx = WorkDirContext::new(source, work.path().join("work"), "thumb").unwrap();

  let options = ThumbnailOptions {
    fraction: Some(0.25),
    ..ThumbnailOptions::default()
  };
  let path = extract_thumbnail(&ctx, &options).await.unwrap();
  assert_eq!(path.extension().unwrap(), "png");
  assert_eq!(std::fs::read(&path).unwrap(), b"transcoded-bytes");
}
