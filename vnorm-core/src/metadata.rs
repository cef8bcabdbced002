//! Best-effort sanitization of the stream tags that survive into the
//! output when the source's own metadata tables are being dropped.

/// Title length cap, counted in UTF-16 code units.
pub const TITLE_MAX_CODE_UNITS: usize = 24;

/// Strips control characters, trims whitespace and caps the length at
/// [`TITLE_MAX_CODE_UNITS`]. An empty result becomes `None`. Unpaired
/// surrogates cannot occur in a Rust string, so the cap is the only
/// length-related concern left.
pub fn sanitize_title(raw: &str) -> Option<String> {
  let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
  let cleaned = cleaned.trim();
  let mut out = String::new();
  let mut units = 0;
  for ch in cleaned.chars() {
    let n = ch.len_utf16();
    if units + n > TITLE_MAX_CODE_UNITS {
      break;
    }
    units += n;
    out.push(ch);
  }
  let out = out.trim_end().to_owned();
  if out.is_empty() {
    None
  } else {
    Some(out)
  }
}

/// Accepts 2-3 letter ASCII language tags, lowercased; anything else is
/// dropped rather than carried through mangled.
pub fn sanitize_language(raw: &str) -> Option<String> {
  let trimmed = raw.trim();
  if crate::regex!("^[A-Za-z]{2,3}$").is_match(trimmed) {
    Some(trimmed.to_ascii_lowercase())
  } else {
    None
  }
}
