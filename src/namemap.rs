//! Escaping for the seven characters that are legal in an ext4 filename but
//! forbidden in NTFS: `* | : > < ? "`.
//!
//! Each forbidden byte is replaced by `#` followed by its four hex digits
//! (e.g. `:` → `#003A`). `/` is the path separator and control characters
//! are left untouched; both are the filesystem call's problem, not this
//! mapper's.

const ESCAPED: &[u8] = b"*|:><?\"";

pub fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii() && ESCAPED.contains(&(ch as u8)) {
            out.push_str(&format!("#{:04X}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn unescape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let chars: Vec<char> = name.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '#' && i + 4 < chars.len() {
            let hex: String = chars[i + 1..i + 5].iter().collect();
            if let Ok(code) = u32::from_str_radix(&hex, 16) {
                if let Some(ch) = char::from_u32(code) {
                    out.push(ch);
                    i += 5;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Escapes every path component independently, leaving `/` as the separator.
pub fn escape_path(path: &str) -> String {
    path.split('/').map(escape).collect::<Vec<_>>().join("/")
}

pub fn unescape_path(path: &str) -> String {
    path.split('/').map(unescape).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_each_forbidden_character() {
        for &byte in ESCAPED {
            let ch = byte as char;
            let escaped = escape(&ch.to_string());
            assert_eq!(escaped, format!("#{:04X}", ch as u32));
        }
    }

    #[test]
    fn colon_round_trips() {
        let name = "foo:bar";
        let escaped = escape(name);
        assert_eq!(escaped, "foo#003Abar");
        assert_eq!(unescape(&escaped), name);
    }

    #[test]
    fn leaves_ordinary_characters_alone() {
        assert_eq!(escape("hello.txt"), "hello.txt");
        assert_eq!(unescape("hello.txt"), "hello.txt");
    }

    #[test]
    fn path_escape_preserves_separators() {
        let path = "etc/foo:bar/baz?qux";
        let escaped = escape_path(path);
        assert_eq!(escaped, "etc/foo#003Abar/baz#003Fqux");
        assert_eq!(unescape_path(&escaped), path);
    }

    #[test]
    fn inverse_on_mixed_input() {
        let sample = "a*b|c:d>e<f?g\"h";
        assert_eq!(unescape(&escape(sample)), sample);
    }
}
