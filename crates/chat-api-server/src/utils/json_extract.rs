/// Extract the first JSON object substring from a possibly noisy LLM output.
/// Handles nested braces and braces inside JSON strings (with escapes).
pub fn extract_first_json_object(s: &str) -> Option<&str> {
    let mut start: Option<usize> = None;
    let mut depth: i32 = 0;

    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if start.is_none() {
            if ch == '{' {
                start = Some(i);
                depth = 1;
                in_string = false;
                escaped = false;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let st = start?;
                    return Some(&s[st..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_markdown_fence() {
        let raw = "```json\n{\"summary\": \"hello\"}\n```";
        assert_eq!(extract_first_json_object(raw), Some("{\"summary\": \"hello\"}"));
    }

    #[test]
    fn handles_nested_and_braces_in_strings() {
        let raw = r#"noise {"a": {"b": "}"}, "c": 1} trailing"#;
        assert_eq!(
            extract_first_json_object(raw),
            Some(r#"{"a": {"b": "}"}, "c": 1}"#)
        );
    }

    #[test]
    fn none_when_no_object() {
        assert_eq!(extract_first_json_object("plain text"), None);
    }
}
