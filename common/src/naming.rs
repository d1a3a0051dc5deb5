//! 出力ファイル名の生成

use regex::Regex;

/// 空になった場合の代替名
pub const FALLBACK_FILE_STEM: &str = "Unknown";

/// 出力ファイル名の接尾辞
pub const OUTPUT_SUFFIX: &str = "_.png";

/// ファイル名に使えない文字を取り除く
///
/// `\ / * ? : " < > |` を削除して前後の空白を落とし、空なら `Unknown`。
pub fn sanitize(name: &str) -> String {
    lazy_static::lazy_static! {
        static ref ILLEGAL_RE: Regex = Regex::new(r#"[\\/*?:"<>|]"#).unwrap();
    }

    let cleaned = ILLEGAL_RE.replace_all(name, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}

/// 識別子から `<識別子>_.png` を作る
pub fn output_file_name(identifier: &str) -> String {
    format!("{}{}", sanitize(identifier), OUTPUT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_illegal_chars() {
        assert_eq!(sanitize("A/B:1"), "AB1");
        assert_eq!(sanitize(r#"a\b*c?d"e<f>g|h"#), "abcdefgh");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize(""), "Unknown");
        assert_eq!(sanitize("  "), "Unknown");
        assert_eq!(sanitize("///"), "Unknown");
    }

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize("  NV001 "), "NV001");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize("Nguyễn Văn A"), "Nguyễn Văn A");
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("1001"), "1001_.png");
        assert_eq!(output_file_name(""), "Unknown_.png");
    }
}
