// Sound names stored as 16 character codes inside the parameter vector

use std::sync::LazyLock;
use regex::Regex;

use crate::constants::{NAME_CHAR_MAX, NAME_CHAR_MIN, NAME_LEN, NAME_OFFSET, NAME_SUFFIX_MAX, UNTITLED_NAME};

static SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)~([0-9]{1,3})$").expect("static regex"));

/// Display glyph for a name character code. Code 127 renders as a degree sign.
pub fn glyph_for_code(code: i32) -> char {
    match code {
        127 => '°',
        c if (NAME_CHAR_MIN..NAME_CHAR_MAX).contains(&c) => char::from(c as u8),
        _ => ' ',
    }
}

fn code_for_glyph(glyph: char) -> i32 {
    match glyph {
        '°' => 127,
        c if c.is_ascii() && (NAME_CHAR_MIN..NAME_CHAR_MAX).contains(&(c as i32)) => c as i32,
        _ => i32::from(b'?'),
    }
}

/// Decode the name characters, trimming trailing padding.
pub fn read_name(params: &[i32]) -> String {
    let name: String = params
        .iter()
        .skip(NAME_OFFSET)
        .take(NAME_LEN)
        .map(|c| glyph_for_code(*c))
        .collect();
    name.trim_end().to_string()
}

/// Encode `name` into the name characters, padding with spaces.
pub fn write_name(params: &mut [i32], name: &str) {
    let mut glyphs = name.chars();
    for slot in params.iter_mut().skip(NAME_OFFSET).take(NAME_LEN) {
        *slot = glyphs.next().map(code_for_glyph).unwrap_or(i32::from(b' '));
    }
}

/// Name encoded as character codes, as stored in the name columns.
pub fn encode_name(name: &str) -> Vec<i32> {
    let mut codes = vec![0; NAME_OFFSET + NAME_LEN];
    write_name(&mut codes, name);
    codes.split_off(NAME_OFFSET)
}

/// Next candidate for a duplicate's name: `Pad~3` -> `Pad~4`, `Pad` -> `Pad~1`,
/// blank -> `Init~1`. `~999` wraps to `~1`. The base is truncated to fit.
pub fn next_duplicate_name(name: &str) -> String {
    let trimmed = name.trim_end();
    let (base, next) = match SUFFIX_RE.captures(trimmed) {
        Some(caps) => {
            let n: u32 = caps[2].parse().unwrap_or(0);
            let next = if n >= NAME_SUFFIX_MAX { 1 } else { n + 1 };
            (caps[1].to_string(), next)
        }
        None if trimmed.trim().is_empty() => (UNTITLED_NAME.to_string(), 1),
        None => (trimmed.to_string(), 1),
    };

    let suffix = format!("~{}", next);
    let room = NAME_LEN.saturating_sub(suffix.chars().count());
    let base: String = base.chars().take(room).collect();
    format!("{}{}", base.trim_end(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PARAM_COUNT;

    #[test]
    fn test_name_round_trip() {
        let mut params = vec![0; PARAM_COUNT];
        write_name(&mut params, "Fat Bass°");
        assert_eq!(read_name(&params), "Fat Bass°");
        assert_eq!(params[NAME_OFFSET + NAME_LEN - 1], 32);
    }

    #[test]
    fn test_name_truncates_to_field() {
        let mut params = vec![0; PARAM_COUNT];
        write_name(&mut params, "A very long patch name indeed");
        assert_eq!(read_name(&params), "A very long patc");
    }

    #[test]
    fn test_next_duplicate_name() {
        assert_eq!(next_duplicate_name("Pad"), "Pad~1");
        assert_eq!(next_duplicate_name("Pad~1"), "Pad~2");
        assert_eq!(next_duplicate_name("Pad~41"), "Pad~42");
        assert_eq!(next_duplicate_name("Pad~999"), "Pad~1");
        assert_eq!(next_duplicate_name(""), "Init~1");
        assert_eq!(next_duplicate_name("   "), "Init~1");
        assert_eq!(next_duplicate_name("Sixteen Chars Ab"), "Sixteen Chars~1");
        assert_eq!(next_duplicate_name("Sixteen Chars~99"), "Sixteen Char~100");
    }

    #[test]
    fn test_glyphs() {
        assert_eq!(glyph_for_code(65), 'A');
        assert_eq!(glyph_for_code(127), '°');
        assert_eq!(glyph_for_code(5), ' ');
    }
}
