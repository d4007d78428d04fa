//! Echo suppression
//!
//! Many child processes echo back the line they were just sent. Since the
//! console already shows locally submitted input, output that only repeats
//! the last input is dropped from display.

/// Returns true when `candidate` merely restates `last_input`.
///
/// Matches only the exact string, or the string with every `"\r\n"`
/// removed. Partial echoes and `\n`-only terminators are not caught.
pub fn should_suppress(candidate: &str, last_input: Option<&str>) -> bool {
    match last_input {
        Some(last) if !last.is_empty() => {
            candidate == last || candidate.replace("\r\n", "") == last
        }
        _ => false,
    }
}

/// Tracks the most recent input sent to the process
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    last_input: Option<String>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `input` as the latest line sent. Never cleared, only replaced.
    pub fn set_last_input(&mut self, input: &str) {
        self.last_input = Some(input.to_string());
    }

    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }

    /// Check process output against the last input
    pub fn should_suppress(&self, candidate: &str) -> bool {
        should_suppress(candidate, self.last_input())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_crlf_echo_suppressed() {
        assert!(should_suppress("hello", Some("hello")));
        assert!(should_suppress("hello\r\n", Some("hello")));
        assert!(!should_suppress("hello world", Some("hello")));
    }

    #[test]
    fn test_no_last_input_never_suppresses() {
        assert!(!should_suppress("hello", None));
        assert!(!should_suppress("", Some("")));
        assert!(!should_suppress("", None));
    }

    #[test]
    fn test_known_limitations() {
        // Unix line endings are not normalized
        assert!(!should_suppress("hello\n", Some("hello")));
        // Trailing whitespace breaks the match
        assert!(!should_suppress("hello \r\n", Some("hello")));
        // Genuine output equal to the last input is hidden
        assert!(should_suppress("yes", Some("yes")));
    }

    #[test]
    fn test_last_input_is_replaced_not_cleared() {
        let mut echo = EchoSuppressor::new();
        assert!(!echo.should_suppress("ls"));

        echo.set_last_input("ls");
        assert!(echo.should_suppress("ls\r\n"));
        // Still compared long after the write
        assert!(echo.should_suppress("ls"));

        echo.set_last_input("pwd");
        assert!(!echo.should_suppress("ls"));
        assert!(echo.should_suppress("pwd"));
        assert_eq!(echo.last_input(), Some("pwd"));
    }
}
