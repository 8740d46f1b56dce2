//! SeerbornBot environment diagnostics.
//!
//! Prints the locale variables that decide how the terminal and log viewers
//! treat UTF-8, reports whether the bot's secrets are present (never their
//! values), and writes a Cyrillic/emoji probe line to stdout. Run it on a new
//! host before starting the bot when replies or logs come out garbled.

use std::io::Write;

use anyhow::{Context, Result};

const LOCALE_VARS: &[&str] = &["LANG", "LC_ALL", "LC_CTYPE"];
const SECRET_VARS: &[&str] = &["BOT_TOKEN", "OPENAI_API_KEY"];
const PROBE: &str = "Тест вывода кириллицы: Привет, мир 🌍";

fn is_utf8_locale(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.contains("utf-8") || lower.contains("utf8")
}

/// Build the report lines from an arbitrary variable source.
fn report<F>(lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut lines = vec!["=== SeerbornBot environment diagnostics ===".to_string()];

    let mut utf8_locale = false;
    for &var in LOCALE_VARS {
        match lookup(var) {
            Some(value) => {
                utf8_locale |= is_utf8_locale(&value);
                lines.push(format!("{} = {}", var, value));
            }
            None => lines.push(format!("{} = <unset>", var)),
        }
    }

    if utf8_locale {
        lines.push("Locale: UTF-8".to_string());
    } else {
        lines.push(
            "Locale: no UTF-8 locale found; set LANG=C.UTF-8 so logs render correctly"
                .to_string(),
        );
    }

    for &var in SECRET_VARS {
        let state = match lookup(var) {
            Some(value) if !value.trim().is_empty() => "set",
            _ => "MISSING",
        };
        lines.push(format!("{}: {}", var, state));
    }

    lines
}

fn main() -> Result<()> {
    // Same secret sources as the bot itself
    dotenvy::dotenv().ok();

    let mut stdout = std::io::stdout().lock();
    for line in report(|name| std::env::var(name).ok()) {
        writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
    }

    writeln!(stdout, "{}", PROBE).context("Terminal rejected the UTF-8 probe line")?;
    writeln!(stdout, "=== done ===").context("Failed to write to stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_utf8_locale_detection() {
        assert!(is_utf8_locale("ru_RU.UTF-8"));
        assert!(is_utf8_locale("C.utf8"));
        assert!(!is_utf8_locale("POSIX"));
    }

    #[test]
    fn test_report_with_utf8_locale_and_secrets() {
        let lines = report(lookup(&[
            ("LANG", "ru_RU.UTF-8"),
            ("BOT_TOKEN", "123:secret"),
            ("OPENAI_API_KEY", "sk-secret"),
        ]));

        assert!(lines.contains(&"LANG = ru_RU.UTF-8".to_string()));
        assert!(lines.contains(&"LC_ALL = <unset>".to_string()));
        assert!(lines.contains(&"Locale: UTF-8".to_string()));
        assert!(lines.contains(&"BOT_TOKEN: set".to_string()));
        assert!(lines.contains(&"OPENAI_API_KEY: set".to_string()));
        assert!(lines.iter().all(|l| !l.contains("secret")));
    }

    #[test]
    fn test_report_flags_missing_secret_and_locale() {
        let lines = report(lookup(&[("LANG", "C"), ("BOT_TOKEN", "")]));

        assert!(lines.iter().any(|l| l.starts_with("Locale: no UTF-8 locale")));
        assert!(lines.contains(&"BOT_TOKEN: MISSING".to_string()));
        assert!(lines.contains(&"OPENAI_API_KEY: MISSING".to_string()));
    }
}
