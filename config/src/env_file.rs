//! Parse a project `.env` file into a key-value map. Application to the process
//! environment (and precedence against it) happens in lib.rs, not here.

use std::collections::HashMap;
use std::path::Path;

/// Path to try for `.env`: `override_dir` if given, else the current directory.
fn env_file_path(override_dir: Option<&Path>) -> Option<std::path::PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Minimal .env parser: KEY=VALUE lines, skip empty lines and # comments, trim key and value.
///
/// * Empty value: `KEY=` or `KEY=""` yields the key with value `""`.
/// * Comments: only lines starting with `#` (after trim) are skipped; `#` inside a value is kept.
/// * Quotes: double-quoted values support `\"` escapes; single-quoted values are stripped, no escapes.
/// * No multiline values or line continuation.
fn parse(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim().to_string();
        let value = v.trim().to_string();
        let value = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else {
            value
        };
        let value = value
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .map(|s| s.to_string())
            .unwrap_or(value);
        if !key.is_empty() {
            out.insert(key, value);
        }
    }
    out
}

/// Load `.env` from `override_dir` or the current directory. Missing file returns an empty map.
pub fn read_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let path = match env_file_path(override_dir) {
        Some(p) => p,
        None => return Ok(HashMap::new()),
    };
    let content = std::fs::read_to_string(&path)?;
    Ok(parse(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let m = parse("FOO=bar\nBAZ=quux\n");
        assert_eq!(m.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(m.get("BAZ"), Some(&"quux".to_string()));
    }

    #[test]
    fn skip_comments_and_empty() {
        let m = parse("\n# comment\nKEY=val\n  \n");
        assert_eq!(m.get("KEY"), Some(&"val".to_string()));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn quoted_value() {
        let m = parse(r#"KEY="hello world""#);
        assert_eq!(m.get("KEY"), Some(&"hello world".to_string()));
    }

    #[test]
    fn single_quoted_value() {
        let m = parse("KEY='single quoted'");
        assert_eq!(m.get("KEY"), Some(&"single quoted".to_string()));
    }

    #[test]
    fn line_without_equals_skipped() {
        let m = parse("NOT_KEY_VALUE\nKEY=val\n");
        assert_eq!(m.get("KEY"), Some(&"val".to_string()));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn empty_key_skipped() {
        let m = parse("=value_only\nKEY=ok\n");
        assert_eq!(m.get("KEY"), Some(&"ok".to_string()));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn empty_value_forms() {
        let m = parse("KEY=\nQUOTED=\"\"\nOTHER=val\n");
        assert_eq!(m.get("KEY"), Some(&"".to_string()));
        assert_eq!(m.get("QUOTED"), Some(&"".to_string()));
        assert_eq!(m.get("OTHER"), Some(&"val".to_string()));
    }

    #[test]
    fn escaped_quote_in_double_quoted() {
        let m = parse(r#"KEY="say \"hi\"""#);
        assert_eq!(m.get("KEY"), Some(&"say \"hi\"".to_string()));
    }

    #[test]
    fn read_map_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let m = read_map(Some(dir.path())).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn read_map_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\nB=2\n").unwrap();
        let m = read_map(Some(dir.path())).unwrap();
        assert_eq!(m.get("A"), Some(&"1".to_string()));
        assert_eq!(m.get("B"), Some(&"2".to_string()));
    }
}
