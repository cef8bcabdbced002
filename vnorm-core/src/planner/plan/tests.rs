use super::*;
use crate::capabilities::Capabilities;
use crate::options::{BitsPerChannel, ChromaSubsampling, ProcessingOptions};
use crate::planner::validate;
use crate::probe::Stream;
use crate::testutil::{audio, data_stream, file_info, hdr_video, subtitle, thumbnail_video, video};

fn build(
  info: &crate::probe::FileInfo,
  options: &ProcessingOptions,
  compat: &[bool],
) -> CommandPlan {
  let caps = Capabilities::all_enabled();
  let analysis = validate::analyze(info, options).unwrap();
  build_plan(info, options, &caps, compat, &analysis).unwrap()
}

fn override_for(plan: &CommandPlan, kind: StreamKind, index: usize) -> &StreamOverride {
  plan
    .overrides
    .iter()
    .find(|o| o.selector == Some(StreamSelector::at(kind, index)))
    .expect("override present")
}

#[test]
fn compliant_streams_are_copied() {
  let info = file_info(
    "matroska,webm",
    vec![
      Stream::Video(video("h264")),
      Stream::Audio(audio("aac", Some("LC"), 2, 48000)),
    ],
  );
  let options = ProcessingOptions::standard_h264_aac_mp4();
  let plan = build(&info, &options, &[true, true]);
  assert_eq!(plan.maps, vec![MapDirective::whole_input(0)]);
  assert_eq!(override_for(&plan, StreamKind::Video, 0).codec.as_deref(), Some("copy"));
  assert_eq!(override_for(&plan, StreamKind::Audio, 0).codec.as_deref(), Some("copy"));
  assert!(plan.size_checks.is_empty());
  // ThumbnailOnly keeps the metadata tables
  assert_eq!(plan.map_metadata, Some(0));
  assert_eq!(plan.map_chapters, Some(0));
}

#[test]
fn hdr_remap_builds_the_full_reencode_override() {
  let info = file_info("matroska,webm", vec![Stream::Video(hdr_video())]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.remap_hdr_to_sdr = true;
  options.maximum_bits_per_channel = BitsPerChannel::Limit8;
  options.maximum_chroma_subsampling = ChromaSubsampling::Limit420;
  let plan = build(&info, &options, &[true]);
  let o = override_for(&plan, StreamKind::Video, 0);
  assert_eq!(o.codec.as_deref(), Some("libx264"));
  assert_eq!(o.pix_fmt.as_deref(), Some("yuv420p"));
  assert_eq!(o.color_range.as_deref(), Some("pc"));
  assert_eq!(o.profile.as_deref(), Some("high"));
  assert_eq!(o.crf, Some(VIDEO_CRF_H264));
  let filter = o.filter.as_deref().unwrap();
  assert!(filter.contains("zscale=transfer=linear"));
  assert!(filter.contains("tonemap=mobius"));
  assert!(filter.contains("format=yuv420p"));
}

#[test]
fn sdr_range_conversion_uses_scale_out_range() {
  let info = file_info("matroska,webm", vec![Stream::Video(video("vp8"))]);
  let options = ProcessingOptions::standard_h264_aac_mp4();
  let plan = build(&info, &options, &[true]);
  let o = override_for(&plan, StreamKind::Video, 0);
  // vp8 is not in the result list, so this is a re-encode of a limited-range source
  assert_eq!(o.codec.as_deref(), Some("libx264"));
  assert_eq!(o.filter.as_deref(), Some("scale=out_range=pc"));
}

#[test]
fn audio_reencode_prefers_the_fdk_encoder() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Audio(audio("flac", None, 2, 48000)),
  ]);
  let options = ProcessingOptions::standard_h264_aac_mp4();
  let plan = build(&info, &options, &[true, true]);
  let o = override_for(&plan, StreamKind::Audio, 0);
  assert_eq!(o.codec.as_deref(), Some("libfdk_aac"));
  assert_eq!(o.vbr, Some(AAC_VBR_QUALITY));
  assert_eq!(o.profile.as_deref(), Some("lc"));
  assert_eq!(o.cutoff, Some(AAC_VBR_CUTOFF_HZ));
}

#[test]
fn native_aac_fallback_uses_per_channel_bitrate() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Audio(audio("flac", None, 6, 48000)),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.max_channels = Some(2);
  let caps = Capabilities {
    encode_libfdk_aac: false,
    ..Capabilities::all_enabled()
  };
  let analysis = validate::analyze(&info, &options).unwrap();
  let plan = build_plan(&info, &options, &caps, &[true, true], &analysis).unwrap();
  let o = override_for(&plan, StreamKind::Audio, 0);
  assert_eq!(o.codec.as_deref(), Some("aac"));
  assert_eq!(o.channels, Some(2));
  assert_eq!(o.bitrate, Some(2 * AAC_BITRATE_PER_CHANNEL));
  assert_eq!(o.vbr, None);
}

#[test]
fn select_smallest_tracks_only_unrequired_reencodes() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Audio(audio("flac", None, 2, 48000)),
    Stream::Audio(audio("opus", None, 2, 48000)),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.audio_reencode_mode = crate::options::ReencodeMode::SelectSmallest;
  // flac and opus are both mp4-muxable but not in the aac result list:
  // the re-encode is required, so nothing is tracked
  let plan = build(&info, &options, &[true, true, true]);
  assert!(plan.size_checks.is_empty());

  // with the codecs accepted in the result list, the mode alone drives the
  // re-encode and both streams are tracked
  options.result_audio_codecs = vec![
    crate::catalog::AudioCodec::AacLc,
    crate::catalog::AudioCodec::Flac,
    crate::catalog::AudioCodec::Opus,
  ];
  let plan = build(&info, &options, &[true, true, true]);
  assert_eq!(plan.size_checks.len(), 2);
  let first = plan.size_checks[0];
  assert_eq!(first.kind, StreamKind::Audio);
  assert_eq!(first.input_index, 1);
  assert_eq!(first.output_index, 0);
  assert_eq!(first.extension, "flac");
  assert!(!first.needs_reencode_for_mp4);
  assert_eq!(plan.size_checks[1].output_index, 1);
}

#[test]
fn remove_audio_streams_excludes_them() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Audio(audio("aac", Some("LC"), 2, 48000)),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.remove_audio_streams = true;
  let plan = build(&info, &options, &[true, true]);
  assert!(plan
    .maps
    .contains(&MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 1))));
  assert!(plan.overrides.iter().all(|o| o.selector.map(|s| s.kind) != Some(StreamKind::Audio)));
}

#[test]
fn incompatible_text_subtitles_become_mov_text() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Subtitle(subtitle("ass")),
    Stream::Subtitle(subtitle("hdmv_pgs_subtitle")),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::Preferred;
  let plan = build(&info, &options, &[true, false, false]);
  let subs = override_for(&plan, StreamKind::Subtitle, 0);
  assert_eq!(subs.codec.as_deref(), Some("mov_text"));
  // sanitized tags ride along because the global metadata is dropped
  assert!(subs.metadata.contains(&("title".to_owned(), "Dialogue".to_owned())));
  assert!(subs.metadata.contains(&("language".to_owned(), "eng".to_owned())));
  // the image subtitle has no path into the container
  assert!(plan
    .maps
    .contains(&MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 2))));
}

#[test]
fn unrecognized_streams_survive_only_mode_none_and_compatible() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Unrecognized(data_stream()),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::None;
  let plan = build(&info, &options, &[true, true]);
  assert!(!plan
    .maps
    .iter()
    .any(|m| *m == MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 1))));

  let plan = build(&info, &options, &[true, false]);
  assert!(plan
    .maps
    .contains(&MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 1))));

  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::ThumbnailOnly;
  let plan = build(&info, &options, &[true, true]);
  assert!(plan
    .maps
    .contains(&MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 1))));
}

#[test]
fn thumbnails_follow_the_metadata_policy() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Video(thumbnail_video("mjpeg")),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::None;
  let plan = build(&info, &options, &[true, true]);
  // kept and copied as the second video output
  assert_eq!(override_for(&plan, StreamKind::Video, 1).codec.as_deref(), Some("copy"));

  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::ThumbnailOnly;
  let plan = build(&info, &options, &[true, true]);
  assert!(plan
    .maps
    .contains(&MapDirective::exclude(0, StreamSelector::at(StreamKind::Any, 1))));
}

#[test]
fn without_preserve_streams_are_mapped_individually() {
  let info = file_info("matroska,webm", vec![
    Stream::Video(video("h264")),
    Stream::Audio(audio("aac", Some("LC"), 2, 48000)),
    Stream::Subtitle(subtitle("ass")),
  ]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.try_preserve_unrecognized_streams = false;
  let plan = build(&info, &options, &[true, true, false]);
  assert_eq!(
    plan.maps,
    vec![
      MapDirective::stream(0, StreamSelector::at(StreamKind::Any, 0)),
      MapDirective::stream(0, StreamSelector::at(StreamKind::Any, 1)),
    ]
  );
  // no subtitle override without preservation
  assert!(plan.overrides.iter().all(|o| o.selector.map(|s| s.kind) != Some(StreamKind::Subtitle)));
}

#[test]
fn metadata_stripping_remaps_to_nowhere() {
  let info = file_info("matroska,webm", vec![Stream::Video(video("h264"))]);
  let mut options = ProcessingOptions::standard_h264_aac_mp4();
  options.metadata_stripping_mode = crate::options::MetadataStrippingMode::Required;
  let plan = build(&info, &options, &[true]);
  assert_eq!(plan.map_metadata, Some(-1));
  assert_eq!(plan.map_chapters, Some(-1));
}
