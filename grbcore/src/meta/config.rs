use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\[([^ \]]+)(?: "([^"]+)")?\]"#).expect("section header pattern")
    })
}

/// A value from the descriptor file, with `true`/`false` and
/// pure-digit strings coerced.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Value {
    Text(String),
    Bool(bool),
    Number(i64),
}

impl Value {
    pub(super) fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => raw
            .parse()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::Text(raw.to_string())),
        _ => Value::Text(raw.to_string()),
    }
}

/// The key/value descriptor file: bracketed section headers with
/// optional quoted subsection names, followed by `key = value` lines.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct GitConfig {
    sections: HashMap<(String, Option<String>), HashMap<String, Value>>,
}

impl GitConfig {
    pub(super) fn parse(blob: &str) -> Self {
        let mut sections: HashMap<(String, Option<String>), HashMap<String, Value>> =
            HashMap::new();
        let mut current: Option<(String, Option<String>)> = None;

        for line in blob.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                current = section_re().captures(line).map(|caps| {
                    (
                        caps[1].to_string(),
                        caps.get(2).map(|m| m.as_str().to_string()),
                    )
                });
                if let Some(key) = &current {
                    sections.entry(key.clone()).or_default();
                }
                continue;
            }
            let Some(key) = &current else { continue };
            let Some((k, v)) = line.split_once('=') else {
                continue;
            };
            sections
                .entry(key.clone())
                .or_default()
                .insert(k.trim().to_string(), coerce(v.trim()));
        }

        Self { sections }
    }

    pub(super) fn get(
        &self,
        section: &str,
        subsection: Option<&str>,
        key: &str,
    ) -> Option<&Value> {
        self.sections
            .get(&(section.to_string(), subsection.map(str::to_string)))
            .and_then(|values| values.get(key))
    }
}
