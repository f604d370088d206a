//! Template Rendering
//!
//! Substitutes `{{ key }}` placeholders in a prompt template with values
//! from a context mapping.
//!
//! Rules:
//! - keys are trimmed, so `{{input}}` and `{{ input }}` are the same
//! - unknown keys render as the empty string
//! - substituted values are never rescanned
//! - an unterminated `{{` is copied through literally

use std::collections::HashMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders a template against a context mapping.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use promptflow::execution::render::render;
///
/// let mut context = HashMap::new();
/// context.insert("name".to_string(), "World".to_string());
///
/// assert_eq!(render("Hello {{ name }}!", &context), "Hello World!");
/// assert_eq!(render("Hello {{missing}}!", &context), "Hello !");
/// ```
pub fn render(template: &str, context: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];

        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        output.push_str(&rest[..start]);

        let key = after_open[..end].trim();
        if let Some(value) = context.get(key) {
            output.push_str(value);
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    output.push_str(rest);
    output
}

/// Lists placeholder keys in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        let key = after_open[..end].trim().to_string();
        if !names.contains(&key) {
            names.push(key);
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_placeholders_unchanged() {
        let templates = ["", "plain text", "single { brace }", "closing }} only"];
        let contexts = [context(&[]), context(&[("input", "x"), ("a", "b")])];

        for template in templates {
            for ctx in &contexts {
                assert_eq!(render(template, ctx), template);
            }
        }
    }

    #[test]
    fn test_missing_key_renders_empty() {
        assert_eq!(render("[{{x}}]", &context(&[])), "[]");
    }

    #[test]
    fn test_key_whitespace_is_trimmed() {
        let ctx = context(&[("input", "World")]);
        assert_eq!(render("Hello {{input}}", &ctx), "Hello World");
        assert_eq!(render("Hello {{  input  }}", &ctx), "Hello World");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let ctx = context(&[("input", "x")]);
        assert_eq!(render("{{input}}-{{input}}-{{ input }}", &ctx), "x-x-x");
    }

    #[test]
    fn test_no_recursive_expansion() {
        let ctx = context(&[("a", "{{b}}"), ("b", "nope")]);
        assert_eq!(render("{{a}}", &ctx), "{{b}}");
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let ctx = context(&[("input", "x")]);
        assert_eq!(render("{{input}} and {{input", &ctx), "x and {{input");
    }

    #[test]
    fn test_multiline_value() {
        let ctx = context(&[("input", "line1\nline2")]);
        assert_eq!(render("Text:\n{{input}}\nEnd", &ctx), "Text:\nline1\nline2\nEnd");
    }

    #[test]
    fn test_render_is_deterministic() {
        let ctx = context(&[("input", "World"), ("name", "Bob")]);
        let template = "{{name}} says {{input}} {{other}}";
        assert_eq!(render(template, &ctx), render(template, &ctx));
    }

    #[test]
    fn test_placeholders_listed_once_in_order() {
        let names = placeholders("{{ b }} {{a}} {{b}} {{c");
        assert_eq!(names, vec!["b", "a"]);
    }
}
