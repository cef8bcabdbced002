use quickcheck_macros::quickcheck;

use super::*;

#[test]
fn video_probe_name_round_trip() {
  for codec in VideoCodec::ALL {
    assert_eq!(VideoCodec::from_probe_name(codec.probe_name()), Some(codec));
  }
}

#[test]
fn video_encodable_have_encoders() {
  for codec in VideoCodec::ALL {
    assert_eq!(codec.is_encodable(), codec.encoder_name().is_some());
  }
}

#[test]
fn audio_profile_beats_wildcard() {
  assert_eq!(AudioCodec::from_probe("aac", Some("LC")), Some(AudioCodec::AacLc));
  assert_eq!(AudioCodec::from_probe("aac", Some("HE-AAC")), Some(AudioCodec::Aac));
  assert_eq!(AudioCodec::from_probe("aac", None), Some(AudioCodec::Aac));
  assert_eq!(AudioCodec::from_probe("dts", Some("DTS-HD MA")), Some(AudioCodec::Dts));
  assert_eq!(AudioCodec::from_probe("wavpack", None), None);
}

#[test]
fn container_matches_own_aliases() {
  assert!(MediaContainer::Mp4.name_matches("mov,mp4,m4a,3gp,3g2,mj2"));
  assert!(MediaContainer::Mp4.name_matches("mp4"));
  assert!(MediaContainer::Mp4.name_matches("mov"));
  assert!(MediaContainer::Matroska.name_matches("matroska"));
  assert!(MediaContainer::Matroska.name_matches("webm"));
  assert!(!MediaContainer::Mp4.name_matches("matroska"));
  assert!(!MediaContainer::Avi.name_matches("mpegts"));
}

#[test]
fn single_token_names_require_equality() {
  assert!(MediaContainer::Avi.name_matches("avi"));
  assert!(!MediaContainer::Avi.name_matches("avi2"));
  // "mpegts" and "mpeg" are distinct single-token names
  assert!(!MediaContainer::Mpeg.name_matches("mpegts"));
  assert!(!MediaContainer::MpegTs.name_matches("mpeg"));
}

#[test]
fn probe_lookup_prefers_declaration_order() {
  assert_eq!(MediaContainer::from_probe_name("mov,mp4,m4a,3gp,3g2,mj2"), Some(MediaContainer::Mp4));
  assert_eq!(MediaContainer::from_probe_name("matroska,webm"), Some(MediaContainer::Matroska));
  assert_eq!(MediaContainer::from_probe_name("flv"), None);
}

#[quickcheck]
fn weak_match_is_reflexive(tokens: Vec<u8>) -> bool {
  // build a comma list out of small alphanumeric tokens
  let name = tokens
    .iter()
    .take(6)
    .map(|t| format!("t{}", t % 16))
    .collect::<Vec<_>>()
    .join(",");
  if name.is_empty() {
    return true;
  }
  weak_name_match(&name, &name)
}

#[quickcheck]
fn weak_match_is_commutative(a: Vec<u8>, b: Vec<u8>) -> bool {
  let make = |v: &Vec<u8>| {
    v.iter()
      .take(6)
      .map(|t| format!("t{}", t % 16))
      .collect::<Vec<_>>()
      .join(",")
  };
  let a = make(&a);
  let b = make(&b);
  weak_name_match(&a, &b) == weak_name_match(&b, &a)
}
