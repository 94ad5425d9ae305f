//! LIKE pattern matching.
//!
//! SQL LIKE with two wildcards:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A backslash makes the next character literal (`\%`, `\_`, `\\`). A
//! trailing backslash matches itself.
//!
//! `like` is case-sensitive, `ilike` folds both sides to lowercase first.
//! Matching operates on Unicode scalar values.

/// Case-sensitive LIKE.
///
/// ```
/// use rill_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("Hello", "hello"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    matches(&v, &tokenize(pattern))
}

/// Case-insensitive LIKE.
///
/// ```
/// use rill_core::pattern_match::ilike;
/// assert!(ilike("Hello", "h%O"));
/// ```
pub fn ilike(value: &str, pattern: &str) -> bool {
    like(&value.to_lowercase(), &pattern.to_lowercase())
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    Any,
    One,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            c => Token::Literal(c),
        });
    }
    tokens
}

// Greedy matcher that backtracks to the most recent `%` only.
fn matches(v: &[char], p: &[Token]) -> bool {
    let (mut vi, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        match p.get(pi) {
            Some(Token::Any) => {
                star = Some((pi, vi));
                pi += 1;
            }
            Some(Token::One) => {
                vi += 1;
                pi += 1;
            }
            Some(Token::Literal(c)) if *c == v[vi] => {
                vi += 1;
                pi += 1;
            }
            _ => match star {
                Some((sp, sv)) => {
                    pi = sp + 1;
                    vi = sv + 1;
                    star = Some((sp, sv + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|t| *t == Token::Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_basics() {
        assert!(like("", ""));
        assert!(like("", "%"));
        assert!(!like("", "_"));
        assert!(like("abc", "abc"));
        assert!(!like("abc", "ab"));
        assert!(like("abc", "a%"));
        assert!(like("abc", "%c"));
        assert!(like("abc", "%b%"));
        assert!(like("abc", "a_c"));
        assert!(!like("abc", "a_"));
    }

    #[test]
    fn test_like_backtracking() {
        assert!(like("aaab", "%a%b"));
        assert!(like("mississippi", "%iss%pi"));
        assert!(!like("mississippi", "%iss%pix"));
        assert!(like("bug: crash", "bug%crash"));
        assert!(like("ab", "%%b"));
    }

    #[test]
    fn test_like_unicode() {
        assert!(like("héllo", "h_llo"));
        assert!(ilike("ÉCOLE", "é%"));
    }

    #[test]
    fn test_like_escapes() {
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
        assert!(like("a_b", "a\\_b"));
        assert!(!like("axb", "a\\_b"));
        assert!(like("50% off", "%\\%%"));
        assert!(like("c:\\dir", "c:\\\\%"));
        assert!(like("end\\", "end\\"));
        assert!(ilike("DONE_ALL", "done\\_%"));
    }

    #[test]
    fn test_ilike() {
        assert!(ilike("Fix The Bug", "%the%"));
        assert!(!like("Fix The Bug", "%the%"));
    }
}
