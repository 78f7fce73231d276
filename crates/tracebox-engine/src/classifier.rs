//! Line classification for JVM-style stack traces.
//!
//! A trace starts with a header naming an exception type and continues with
//! `Caused by:` and `at ...` lines. Everything else is process noise.

use regex::Regex;
use std::sync::LazyLock;
use tracebox_types::{CausedBy, ExceptionHeader, Frame, TraceLine};

/// Dotted identifier chain whose last token mentions Exception or Throwable,
/// running to end of line (optionally with `: message`). Anchoring at the end
/// skips prose such as `Exception in thread "main"` before the real name.
static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:[A-Za-z_$][\w$]*\.)*[\w$]*(?:Exception|Throwable)[\w$]*)(?::\s*(.*))?$")
        .expect("header regex is valid")
});

static CAUSED_BY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Caused by:\s*([^:\s]+)(?:\s*:\s*(.*))?").expect("caused-by regex is valid")
});

static FRAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^at\s+([^\s(]+)\s*(?:\(([^)]*)\))?").expect("frame regex is valid")
});

/// Classify a line given whether the caller is inside a trace.
///
/// Outside a trace only headers are recognised; inside one, `Caused by:` is
/// tried before `at ...`.
pub fn classify(text: &str, expect_continuation: bool) -> Option<TraceLine> {
    if expect_continuation {
        classify_continuation(text)
    } else {
        classify_header(text).map(TraceLine::ExceptionHeader)
    }
}

pub fn classify_header(text: &str) -> Option<ExceptionHeader> {
    let trimmed = text.trim();
    let captures = HEADER_REGEX.captures(trimmed)?;
    let qualified_name = captures.get(1)?.as_str();
    if qualified_name.is_empty() {
        return None;
    }
    let message = non_empty(captures.get(2).map(|m| m.as_str()));
    Some(ExceptionHeader::new(trimmed, qualified_name, message))
}

pub fn classify_continuation(text: &str) -> Option<TraceLine> {
    let trimmed = text.trim();
    classify_caused_by(trimmed)
        .map(TraceLine::CausedBy)
        .or_else(|| classify_frame(trimmed).map(TraceLine::Frame))
}

/// Try every pattern, header first. Used when re-reading stored traces where
/// the position of a line is already known.
pub fn parse_any(text: &str) -> Option<TraceLine> {
    classify(text, false).or_else(|| classify(text, true))
}

fn classify_caused_by(trimmed: &str) -> Option<CausedBy> {
    let captures = CAUSED_BY_REGEX.captures(trimmed)?;
    let qualified_name = captures.get(1)?.as_str();
    let message = non_empty(captures.get(2).map(|m| m.as_str()));
    Some(CausedBy::new(trimmed, qualified_name, message))
}

fn classify_frame(trimmed: &str) -> Option<Frame> {
    let captures = FRAME_REGEX.captures(trimmed)?;
    let raw_method_ref = captures.get(1)?.as_str();
    let (file_simple_name, line_number) = captures
        .get(2)
        .map(|location| parse_location(location.as_str()))
        .unwrap_or((None, None));

    Some(Frame::new(
        trimmed,
        raw_method_ref,
        enclosing_type(raw_method_ref),
        file_simple_name,
        line_number,
    ))
}

/// `C.java:42` -> (`C.java`, 42). `Native Method` and `Unknown Source` carry no file.
fn parse_location(location: &str) -> (Option<String>, Option<u32>) {
    let location = location.trim();
    let (file, line_number) = match location.rsplit_once(':') {
        Some((file, line)) => match line.trim().parse::<u32>() {
            Ok(n) => (file, Some(n)),
            Err(_) => (location, None),
        },
        None => (location, None),
    };

    let file = (!file.is_empty() && !file.contains(char::is_whitespace)).then(|| file.to_string());
    (file, line_number)
}

/// Type that encloses a frame's method, used for symbol lookup.
///
/// The reference is cut at the first `$` (inner/anonymous class marker) or at
/// the last `.` (method separator), whichever comes first. A leading module or
/// classloader prefix (`java.base/`, `app//`) is dropped beforehand.
pub fn enclosing_type(method_ref: &str) -> Option<String> {
    let reference = match method_ref.rfind('/') {
        Some(idx) if !method_ref[..idx].contains('$') => &method_ref[idx + 1..],
        _ => method_ref,
    };

    let cut = match (reference.find('$'), reference.rfind('.')) {
        (Some(dollar), Some(dot)) => dollar.min(dot),
        (Some(dollar), None) => dollar,
        (None, Some(dot)) => dot,
        (None, None) => return None,
    };

    let enclosing = &reference[..cut];
    (!enclosing.is_empty()).then(|| enclosing.to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_with_thread_prefix() {
        let header =
            classify_header("Exception in thread \"main\" java.lang.RuntimeException: some").unwrap();
        assert_eq!(header.qualified_name, "java.lang.RuntimeException");
        assert_eq!(header.message.as_deref(), Some("some"));
        assert_eq!(
            header.text,
            "Exception in thread \"main\" java.lang.RuntimeException: some"
        );
    }

    #[test]
    fn test_header_without_message() {
        let header = classify_header("Exception in thread \"main\" some.OtherException").unwrap();
        assert_eq!(header.qualified_name, "some.OtherException");
        assert_eq!(header.message, None);
    }

    #[test]
    fn test_header_message_may_contain_colons_and_exception_words() {
        let header =
            classify_header("java.lang.IllegalStateException: wrapped: x.YException").unwrap();
        assert_eq!(header.qualified_name, "java.lang.IllegalStateException");
        assert_eq!(header.message.as_deref(), Some("wrapped: x.YException"));
    }

    #[test]
    fn test_throwable_header() {
        let header = classify_header("  java.lang.Throwable").unwrap();
        assert_eq!(header.qualified_name, "java.lang.Throwable");
        assert_eq!(header.text, "java.lang.Throwable");
    }

    #[test]
    fn test_noise_is_not_a_header() {
        assert!(classify_header("Process finished with exit code 1").is_none());
        assert!(classify_header("Started application in 3.2 seconds").is_none());
        assert!(classify_header("").is_none());
    }

    #[test]
    fn test_frame_mentioning_exception_type_is_not_a_header() {
        assert!(classify_header("at com.foo.BarException.<init>(BarException.java:10)").is_none());
    }

    #[test]
    fn test_header_pattern_ignored_inside_trace() {
        assert!(classify("java.lang.RuntimeException: x", true).is_none());
    }

    #[test]
    fn test_caused_by_tried_before_frame() {
        let line = classify("Caused by: java.io.IOException: disk full", true).unwrap();
        match line {
            TraceLine::CausedBy(caused) => {
                assert_eq!(caused.qualified_name, "java.io.IOException");
                assert_eq!(caused.message.as_deref(), Some("disk full"));
            }
            other => panic!("Expected CausedBy, got {:?}", other),
        }
    }

    #[test]
    fn test_caused_by_without_message() {
        let line = classify_continuation("Caused by: a.b.CException").unwrap();
        match line {
            TraceLine::CausedBy(caused) => {
                assert_eq!(caused.qualified_name, "a.b.CException");
                assert_eq!(caused.message, None);
            }
            other => panic!("Expected CausedBy, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_with_inner_class() {
        let line = classify("\tat a.b.C$Inner.method(C.java:42)", true).unwrap();
        match line {
            TraceLine::Frame(frame) => {
                assert_eq!(frame.raw_method_ref, "a.b.C$Inner.method");
                assert_eq!(frame.enclosing_type.as_deref(), Some("a.b.C"));
                assert_eq!(frame.file_simple_name.as_deref(), Some("C.java"));
                assert_eq!(frame.line_number, Some(42));
                assert_eq!(frame.text, "at a.b.C$Inner.method(C.java:42)");
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_without_line_number() {
        let line = classify_continuation("\tat com.tsarev.MainKt.main(main.kt)").unwrap();
        match line {
            TraceLine::Frame(frame) => {
                assert_eq!(frame.file_simple_name.as_deref(), Some("main.kt"));
                assert_eq!(frame.line_number, None);
                assert_eq!(frame.enclosing_type.as_deref(), Some("com.tsarev.MainKt"));
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_without_location() {
        let line = classify_continuation("at com.tsarev.MainKt.some1").unwrap();
        match line {
            TraceLine::Frame(frame) => {
                assert_eq!(frame.file_simple_name, None);
                assert_eq!(frame.line_number, None);
                assert_eq!(frame.enclosing_type.as_deref(), Some("com.tsarev.MainKt"));
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_native_method_has_no_file() {
        let line = classify_continuation(
            "at java.base/jdk.internal.reflect.NativeMethodAccessorImpl.invoke0(Native Method)",
        )
        .unwrap();
        match line {
            TraceLine::Frame(frame) => {
                assert_eq!(frame.file_simple_name, None);
                assert_eq!(
                    frame.enclosing_type.as_deref(),
                    Some("jdk.internal.reflect.NativeMethodAccessorImpl")
                );
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_enclosing_type_cut_rules() {
        assert_eq!(enclosing_type("a.b.C$Inner.method").as_deref(), Some("a.b.C"));
        assert_eq!(enclosing_type("a.b.C.lambda$main$0").as_deref(), Some("a.b.C"));
        assert_eq!(enclosing_type("a.b.C.method").as_deref(), Some("a.b.C"));
        assert_eq!(enclosing_type("java.base/java.lang.Thread.run").as_deref(), Some("java.lang.Thread"));
        assert_eq!(enclosing_type("app//com.foo.Bar.baz").as_deref(), Some("com.foo.Bar"));
        assert_eq!(
            enclosing_type("com.foo.Bar$$Lambda$14/0x0000000800066840.run").as_deref(),
            Some("com.foo.Bar")
        );
        assert_eq!(enclosing_type("main"), None);
        assert_eq!(enclosing_type(".main"), None);
    }

    #[test]
    fn test_parse_any_prefers_header() {
        assert!(matches!(parse_any("a.FooException"), Some(TraceLine::ExceptionHeader(_))));
        assert!(matches!(parse_any("at a.B.c(B.java:1)"), Some(TraceLine::Frame(_))));
        assert!(parse_any("hello world").is_none());
    }
}
