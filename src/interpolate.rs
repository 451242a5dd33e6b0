//! `${{VAR}}` expansion for tape arguments.

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// Expand `${{VAR}}` placeholders against the process environment.
///
/// Unset variables expand to an empty string. Substituted values are not
/// rescanned.
///
/// ```
/// let home = std::env::var("HOME").unwrap_or_default();
/// assert_eq!(tapereel::interpolate("~ is ${{HOME}}"), format!("~ is {home}"));
/// ```
pub fn interpolate(text: &str) -> String {
    interpolate_with(text, |name| std::env::var(name).ok())
}

/// Expand placeholders using an arbitrary lookup.
///
/// An opening `${{` without a matching `}}` is kept verbatim.
pub fn interpolate_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = after_open[..end].trim();
        if let Some(value) = lookup(name) {
            out.push_str(&value);
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("NAME", "Emmanuel Goldstein"),
            ("LANG", "golang"),
            ("USER", "egoldstein"),
            ("EMPTY", ""),
        ])
    }

    fn expand(text: &str) -> String {
        let env = env();
        interpolate_with(text, |name| env.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_single() {
        assert_eq!(expand("Hello ${{NAME}}"), "Hello Emmanuel Goldstein");
    }

    #[test]
    fn test_multiple() {
        assert_eq!(
            expand("${{LANG}}-${{NAME}}-${{LANG}}"),
            "golang-Emmanuel Goldstein-golang"
        );
    }

    #[test]
    fn test_adjacent() {
        assert_eq!(expand("${{LANG}}${{USER}}"), "golangegoldstein");
    }

    #[test]
    fn test_missing() {
        assert_eq!(expand("Hi ${{MISSING}}"), "Hi ");
    }

    #[test]
    fn test_set_but_empty() {
        assert_eq!(expand("[${{EMPTY}}]"), "[]");
    }

    #[test]
    fn test_content_after() {
        assert_eq!(expand("Hello, ${{USER}}!!!"), "Hello, egoldstein!!!");
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        for text in ["", "plain text", "$HOME", "${NAME}", "{{NAME}}", "$ {{x}}"] {
            assert_eq!(expand(text), text);
        }
    }

    #[test]
    fn test_unterminated_is_verbatim() {
        assert_eq!(expand("Hello ${{NAME"), "Hello ${{NAME");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let text = interpolate_with("${{A}}", |name| {
            (name == "A").then(|| "${{B}}".to_string())
        });
        assert_eq!(text, "${{B}}");
    }

    #[test]
    fn test_process_environment() {
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(interpolate("p=${{PATH}};"), format!("p={path};"));
    }
}
