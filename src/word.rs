//! Token extraction for the text-search fallback

use unicode_general_category::{get_general_category, GeneralCategory};

/// Letter (`L*`), decimal digit (`Nd`), or underscore
///
/// Letter-like numbers such as `Ⅻ` and other numerics such as `²` or `½`
/// end a word.
pub fn is_word_char(c: char) -> bool {
    if c == '_' || c.is_ascii_alphanumeric() {
        return true;
    }
    matches!(
        get_general_category(c),
        GeneralCategory::UppercaseLetter
            | GeneralCategory::LowercaseLetter
            | GeneralCategory::TitlecaseLetter
            | GeneralCategory::ModifierLetter
            | GeneralCategory::OtherLetter
            | GeneralCategory::DecimalNumber
    )
}

/// The identifier-like token under a 0-based code-point column
///
/// When the cursor sits on a non-word character directly after a word (or
/// just past the end of the line), the word to its left is returned.
pub fn word_at(line: &str, column: usize) -> Option<String> {
    let chars: Vec<char> = line.chars().collect();
    if column > chars.len() {
        return None;
    }

    let on_word = chars.get(column).copied().is_some_and(is_word_char);
    let anchor = if on_word {
        column
    } else if column > 0 && is_word_char(chars[column - 1]) {
        column - 1
    } else {
        return None;
    };

    let start = chars[..anchor]
        .iter()
        .rposition(|&c| !is_word_char(c))
        .map_or(0, |i| i + 1);
    let end = chars[anchor..]
        .iter()
        .position(|&c| !is_word_char(c))
        .map_or(chars.len(), |i| anchor + i);

    Some(chars[start..end].iter().collect())
}

/// Line `line` (0-based) of a blob, with any trailing `\r` removed
pub fn line_of(content: &str, line: usize) -> Option<&str> {
    content
        .split('\n')
        .nth(line)
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_under_cursor() {
        assert_eq!(word_at("  foo_bar()", 4).as_deref(), Some("foo_bar"));
        assert_eq!(word_at("  foo_bar()", 2).as_deref(), Some("foo_bar"));
        assert_eq!(word_at("  foo_bar()", 8).as_deref(), Some("foo_bar"));
    }

    #[test]
    fn test_step_back_after_identifier() {
        assert_eq!(word_at("abc def", 3).as_deref(), Some("abc"));
        assert_eq!(word_at("abc", 3).as_deref(), Some("abc"));
        assert_eq!(word_at("  foo_bar()", 9).as_deref(), Some("foo_bar"));
    }

    #[test]
    fn test_no_word() {
        assert_eq!(word_at(" x", 0), None);
        assert_eq!(word_at("a  b", 2), None);
        assert_eq!(word_at("", 0), None);
        assert_eq!(word_at("abc", 4), None);
        assert_eq!(word_at("(", 1), None);
    }

    #[test]
    fn test_unicode_columns_are_code_points() {
        // 'é' is two bytes but one column
        assert_eq!(word_at("x = café + 1", 6).as_deref(), Some("café"));
        assert_eq!(word_at("变量_1 = 2", 1).as_deref(), Some("变量_1"));
        assert_eq!(word_at("let n٣ = 0", 5).as_deref(), Some("n٣"));
    }

    #[test]
    fn test_only_decimal_digits_extend_a_word() {
        assert_eq!(word_at("x² + 1", 0).as_deref(), Some("x"));
        assert_eq!(word_at("x² + 1", 1).as_deref(), Some("x"));
        assert_eq!(word_at("half½", 2).as_deref(), Some("half"));
        assert_eq!(word_at("Ⅻhours", 0), None);
        assert_eq!(word_at("Ⅻhours", 1).as_deref(), Some("hours"));
        assert!(!is_word_char('²'));
        assert!(!is_word_char('Ⅻ'));
        assert!(is_word_char('٣'));
        assert!(is_word_char('ǅ'));
    }

    #[test]
    fn test_same_token_across_whole_word_and_one_past() {
        let line = "    return compute_total(items);";
        let start = line.find("compute_total").unwrap();
        let end = start + "compute_total".len();
        for col in start..=end {
            let first = word_at(line, col);
            assert_eq!(first.as_deref(), Some("compute_total"), "column {}", col);
            assert_eq!(word_at(line, col), first, "idempotent at column {}", col);
        }
    }

    #[test]
    fn test_line_of() {
        let content = "first\r\nsecond\nthird";
        assert_eq!(line_of(content, 0), Some("first"));
        assert_eq!(line_of(content, 1), Some("second"));
        assert_eq!(line_of(content, 2), Some("third"));
        assert_eq!(line_of(content, 3), None);
    }
}
