#[macro_export]
macro_rules! regex {
  ($re:literal $(,)?) => {{
    static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    RE.get_or_init(|| regex::Regex::new($re).unwrap())
  }};
}

#[macro_export]
macro_rules! into_vec {
  ($($x:expr),* $(,)?) => {
    vec![
      $(
        $x.into(),
      )*
    ]
  };
}

/// Greatest common divisor on the positive range.
pub(crate) fn gcd(mut a: i64, mut b: i64) -> i64 {
  while b != 0 {
    let t = b;
    b = a % b;
    a = t;
  }
  a.abs()
}

/// Rounds down to the nearest even number, but never below 2.
pub(crate) fn even_floor(x: i64) -> i64 {
  ((x / 2) * 2).max(2)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gcd_basics() {
    assert_eq!(gcd(120, 2), 2);
    assert_eq!(gcd(60000, 1001), 1);
    assert_eq!(gcd(9, 6), 3);
  }

  #[test]
  fn even_floor_clamps() {
    assert_eq!(even_floor(1279), 1278);
    assert_eq!(even_floor(2), 2);
    assert_eq!(even_floor(1), 2);
  }
}
