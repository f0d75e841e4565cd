//! JSON rendering.

use serde::Serialize;

pub struct JsonOutput;

impl JsonOutput {
    /// Pretty-printed document.
    pub fn format<T: Serialize + ?Sized>(data: &T) -> String {
        serde_json::to_string_pretty(data)
            .unwrap_or_else(|e| format!("{{\n  \"error\": \"{}\"\n}}", e))
    }

    /// One compact object per line.
    pub fn format_lines<T: Serialize>(data: &[T]) -> String {
        data.iter()
            .filter_map(|item| serde_json::to_string(item).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Hit {
        method: String,
        score: f32,
    }

    fn hit(method: &str, score: f32) -> Hit {
        Hit {
            method: method.to_string(),
            score,
        }
    }

    #[test]
    fn test_format_pretty() {
        let output = JsonOutput::format(&hit("readLine", -0.5));
        assert!(output.contains("\"method\": \"readLine\""));
        assert!(output.contains('\n'));
    }

    #[test]
    fn test_format_lines() {
        let output = JsonOutput::format_lines(&[hit("a", -1.0), hit("b", -2.0)]);
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"method":"b","score":-2.0}"#);
    }
}
