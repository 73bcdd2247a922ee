//! Shape-template parsing: plain `KEY=VALUE` files under `config-templates/`
//! that supply defaults below environment variables in the precedence chain
//! (`env > template > built-in default`).

use crate::error::ConfigError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parse a `KEY=VALUE` template file into a map. Comment lines (`#...`) and
/// blank lines are skipped; lines with no `=` are skipped with a logged
/// warning rather than failing the whole file, since a single malformed
/// template line shouldn't block startup.
pub fn parse_template_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::TemplateIo {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_template_str(&content))
}

/// Parse template content already read into memory (used directly by tests
/// and by callers that already hold the file contents).
pub fn parse_template_str(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                log::warn!(
                    "config template: line {} has no '=', skipping: {:?}",
                    lineno + 1,
                    raw_line
                );
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_str_basic() {
        let content = "CPU_P95_SETPOINT=25\nMEM_TARGET_PCT=30\n";
        let values = parse_template_str(content);
        assert_eq!(values.get("CPU_P95_SETPOINT"), Some(&"25".to_string()));
        assert_eq!(values.get("MEM_TARGET_PCT"), Some(&"30".to_string()));
    }

    #[test]
    fn test_parse_template_str_skips_comments_and_blanks() {
        let content = "# a comment\n\nCPU_P95_SETPOINT=25\n  # indented comment\n";
        let values = parse_template_str(content);
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_parse_template_str_skips_malformed_lines() {
        let content = "CPU_P95_SETPOINT=25\nthis line has no equals\nMEM_TARGET_PCT=30\n";
        let values = parse_template_str(content);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_parse_template_str_trims_whitespace() {
        let content = "  CPU_P95_SETPOINT  =  25  \n";
        let values = parse_template_str(content);
        assert_eq!(values.get("CPU_P95_SETPOINT"), Some(&"25".to_string()));
    }

    #[test]
    fn test_parse_template_file_missing_is_error() {
        let result = parse_template_file(Path::new("/nonexistent/path/does-not-exist.env"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_template_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2.env");
        fs::write(&path, "NET_TARGET_PCT=25\n").unwrap();
        let values = parse_template_file(&path).unwrap();
        assert_eq!(values.get("NET_TARGET_PCT"), Some(&"25".to_string()));
    }
}
