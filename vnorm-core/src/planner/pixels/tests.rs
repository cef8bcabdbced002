use super::*;

#[test]
fn grid_covers_every_cell() {
  for chroma in [Chroma::C420, Chroma::C422, Chroma::C444] {
    for bits in [8, 10, 12] {
      let fmt = grid_pix_fmt(chroma, bits);
      let props = pix_fmt_properties(fmt).unwrap();
      assert_eq!(props.chroma, chroma);
      assert_eq!(props.bits, bits);
      assert!(!props.alpha);
    }
  }
}

#[test]
fn h264_clamps_to_ten_bits() {
  let src = pix_fmt_properties("yuv420p12le");
  assert_eq!(
    choose_pix_fmt(src, BitsPerChannel::Preserve, ChromaSubsampling::Preserve, VideoCodec::H264),
    "yuv420p10le"
  );
  assert_eq!(
    choose_pix_fmt(src, BitsPerChannel::Preserve, ChromaSubsampling::Preserve, VideoCodec::Hevc),
    "yuv420p12le"
  );
}

#[test]
fn limits_clamp_but_never_raise() {
  let src = pix_fmt_properties("yuv444p10le");
  assert_eq!(
    choose_pix_fmt(src, BitsPerChannel::Limit8, ChromaSubsampling::Limit420, VideoCodec::H264),
    "yuv420p"
  );
  let low = pix_fmt_properties("yuv420p");
  assert_eq!(
    choose_pix_fmt(low, BitsPerChannel::Limit12, ChromaSubsampling::Limit444, VideoCodec::Hevc),
    "yuv420p"
  );
}

#[test]
fn unknown_formats_fall_back_to_eight_bit_420() {
  assert_eq!(pix_fmt_properties("bayer_bggr8"), None);
  assert_eq!(
    choose_pix_fmt(None, BitsPerChannel::Preserve, ChromaSubsampling::Preserve, VideoCodec::H264),
    "yuv420p"
  );
}

#[test]
fn excess_detection() {
  let ten_bit = pix_fmt_properties("yuv420p10le");
  assert!(bits_exceed(ten_bit, BitsPerChannel::Limit8));
  assert!(!bits_exceed(ten_bit, BitsPerChannel::Limit10));
  assert!(!bits_exceed(ten_bit, BitsPerChannel::Preserve));

  let four22 = pix_fmt_properties("yuv422p");
  assert!(chroma_exceeds(four22, ChromaSubsampling::Limit420));
  assert!(!chroma_exceeds(four22, ChromaSubsampling::Limit422));
  assert!(!chroma_exceeds(None, ChromaSubsampling::Limit420));
}

#[test]
fn hdr_detection() {
  assert!(is_hdr(Some("smpte2084"), None));
  assert!(is_hdr(Some("arib-std-b67"), None));
  assert!(is_hdr(None, Some("bt2020")));
  assert!(!is_hdr(Some("bt709"), Some("bt709")));
  assert!(!is_hdr(None, None));

  assert!(is_known_sdr(None, None));
  assert!(is_known_sdr(Some("bt709"), Some("bt709")));
  assert!(!is_known_sdr(Some("bt2020"), Some("smpte2084")));
  assert!(!is_known_sdr(Some("bt709"), Some("arib-std-b67")));
}

#[test]
fn tonemap_chain_shape() {
  let chain = hdr_to_sdr_chain("yuv420p", false);
  assert_eq!(
    chain,
    "zscale=transfer=linear,format=gbrpf32le,zscale=primaries=709,tonemap=mobius,\
     zscale=transfer=709:matrix=709:range=pc,format=yuv420p"
  );
  assert!(hdr_to_sdr_chain("yuv420p", true).contains("format=gbrapf32le,"));
}

#[test]
fn ntsc_sixty_under_integer_division_is_kept() {
  // 60000/1001 = 59.94 is already under a 60 fps cap: div = 1
  assert_eq!(limit_fps(60000, 1001, FpsLimitMode::LimitByIntegerDivision, 60), None);
}

#[test]
fn integer_division_halves_120_to_60() {
  assert_eq!(
    limit_fps(120, 1, FpsLimitMode::LimitByIntegerDivision, 60),
    Some((60, 1))
  );
}

#[test]
fn integer_division_keeps_ntsc_timing() {
  // 120000/1001 over a 60 cap: div = 2, gcd folds into the numerator
  assert_eq!(
    limit_fps(120000, 1001, FpsLimitMode::LimitByIntegerDivision, 60),
    Some((60000, 1001))
  );
  // a divisor coprime to the numerator multiplies the denominator instead
  assert_eq!(
    limit_fps(145, 1, FpsLimitMode::LimitByIntegerDivision, 60),
    Some((145, 3))
  );
}

#[test]
fn exact_mode_forces_the_target() {
  assert_eq!(limit_fps(120, 1, FpsLimitMode::LimitToExact, 60), Some((60, 1)));
  assert_eq!(limit_fps(50, 1, FpsLimitMode::LimitToExact, 60), None);
  assert_eq!(limit_fps(60, 1, FpsLimitMode::LimitToExact, 60), None);
}

#[test]
fn resize_is_a_no_op_at_the_bounding_box() {
  let bounds = ResizeOptions { width: 1280, height: 720 };
  assert_eq!(fit_resize(1280, 720, bounds), None);
  assert_eq!(fit_resize(640, 480, bounds), None);
}

#[test]
fn one_pixel_over_triggers_rescale() {
  let bounds = ResizeOptions { width: 1280, height: 720 };
  let (w, h) = fit_resize(1281, 720, bounds).unwrap();
  assert!(w <= 1280 && h <= 720);
  assert!(w % 2 == 0 && h % 2 == 0);
}

#[test]
fn resize_preserves_aspect_within_the_box() {
  let bounds = ResizeOptions { width: 1280, height: 720 };
  let (w, h) = fit_resize(3840, 2160, bounds).unwrap();
  assert_eq!((w, h), (1280, 720));
  // portrait source limited by height
  let (w, h) = fit_resize(1080, 1920, bounds).unwrap();
  assert!(h <= 720 && w <= 1280);
  let src_aspect = 1080.0 / 1920.0;
  let out_aspect = w as f64 / h as f64;
  assert!((src_aspect - out_aspect).abs() < 0.02);
}
