use crate::core::Triple;

/// Parse one N-Triples line into a [`Triple`].
///
/// Subjects are IRIs or blank node labels, objects can additionally be
/// plain, typed or language-tagged literals. Datatype and language
/// annotations are stripped; the engine treats object values as opaque
/// strings.
pub fn parse_triple_line(line: &str) -> Result<Triple, String> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Err("Empty line".to_string());
    }

    // Remove trailing dot if present
    let trimmed = trimmed.trim_end_matches('.').trim();

    let (subject, remaining) = parse_term(trimmed, "subject")?;
    let (predicate, remaining) = parse_uri(remaining, "predicate")?;
    let (object, _) = parse_object(remaining)?;

    Ok(Triple { subject, predicate, object })
}

/// Parse a subject position term: a URI in angle brackets or a blank
/// node label.
fn parse_term<'a>(input: &'a str, field_name: &str) -> Result<(String, &'a str), String> {
    let input = input.trim_start();

    if input.starts_with("_:") {
        return parse_blank_node(input);
    }
    parse_uri(input, field_name)
}

/// Parse a URI enclosed in angle brackets
fn parse_uri<'a>(input: &'a str, field_name: &str) -> Result<(String, &'a str), String> {
    let input = input.trim_start();

    if !input.starts_with('<') {
        return Err(format!("Expected '<' for {} URI, got: {}", field_name, input));
    }

    let end_idx = input
        .find('>')
        .ok_or_else(|| format!("Missing closing '>' for {} URI", field_name))?;

    let uri = input[1..end_idx].to_string();
    let remaining = input[end_idx + 1..].trim_start();

    Ok((uri, remaining))
}

fn parse_blank_node(input: &str) -> Result<(String, &str), String> {
    let end_idx = input
        .find(char::is_whitespace)
        .ok_or_else(|| "Unterminated blank node label".to_string())?;
    let label = input[..end_idx].to_string();
    Ok((label, input[end_idx..].trim_start()))
}

/// Parse object which can be:
/// - URI: <http://example.org/resource>
/// - Blank node: _:b1
/// - Plain literal: "some text"
/// - Typed literal: "23.5"^^<http://www.w3.org/2001/XMLSchema#decimal>
/// - Language-tagged literal: "hello"@en
fn parse_object(input: &str) -> Result<(String, &str), String> {
    let input = input.trim_start();

    if input.starts_with('<') {
        return parse_uri(input, "object");
    }

    if input.starts_with("_:") {
        // A blank node object may be the last token on the line
        return match input.find(char::is_whitespace) {
            Some(idx) => Ok((input[..idx].to_string(), input[idx..].trim_start())),
            None => Ok((input.to_string(), "")),
        };
    }

    if input.starts_with('"') {
        return parse_literal(input);
    }

    Err(format!("Invalid object format: {}", input))
}

/// Parse a literal with optional datatype or language tag
fn parse_literal(input: &str) -> Result<(String, &str), String> {
    let input = input.trim_start();

    if !input.starts_with('"') {
        return Err("Literal must start with '\"'".to_string());
    }

    // Find the closing quote, handling escaped quotes
    let mut end_idx = 1;
    let chars: Vec<char> = input.chars().collect();

    while end_idx < chars.len() {
        if chars[end_idx] == '"' && (end_idx == 1 || chars[end_idx - 1] != '\\') {
            break;
        }
        end_idx += 1;
    }

    if end_idx >= chars.len() {
        return Err("Missing closing quote for literal".to_string());
    }

    // Extract the literal value (without quotes)
    let literal_value: String = chars[1..end_idx].iter().collect();
    let byte_end = input
        .char_indices()
        .nth(end_idx)
        .map(|(i, _)| i)
        .unwrap_or(input.len() - 1);
    let after_quote = &input[byte_end + 1..];

    // Check for datatype (^^<URI>) or language tag (@lang)
    let (final_value, remaining) = if after_quote.trim_start().starts_with("^^") {
        let after_caret = after_quote.trim_start()[2..].trim_start();

        if after_caret.starts_with('<') {
            let (_datatype_uri, rest) = parse_uri(after_caret, "datatype")?;
            (literal_value, rest)
        } else {
            // Malformed datatype annotation, keep the bare value
            (literal_value, after_quote)
        }
    } else if after_quote.trim_start().starts_with('@') {
        let after_at = after_quote.trim_start()[1..].trim_start();
        let lang_end =
            after_at.find(|c: char| c.is_whitespace() || c == '.').unwrap_or(after_at.len());
        let remaining = after_at[lang_end..].trim_start();
        (literal_value, remaining)
    } else {
        (literal_value, after_quote.trim_start())
    };

    Ok((final_value, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri_object() {
        let line = r#"<http://example.org/s1> <http://example.org/p1> <http://example.org/o1> ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.subject, "http://example.org/s1");
        assert_eq!(result.predicate, "http://example.org/p1");
        assert_eq!(result.object, "http://example.org/o1");
    }

    #[test]
    fn test_parse_plain_literal() {
        let line = r#"<http://example.org/s1> <http://example.org/name> "Temperature Sensor" ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.object, "Temperature Sensor");
    }

    #[test]
    fn test_parse_typed_literal() {
        let line = r#"<http://example.org/s1> <http://example.org/temp> "23.5"^^<http://www.w3.org/2001/XMLSchema#decimal> ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.object, "23.5");
    }

    #[test]
    fn test_parse_language_tagged_literal() {
        let line = r#"<http://example.org/s1> <http://example.org/label> "hello"@en ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.object, "hello");
    }

    #[test]
    fn test_parse_blank_subject() {
        let line = r#"_:b1 <http://example.org/p1> "v" ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.subject, "_:b1");
    }

    #[test]
    fn test_parse_escaped_quote_in_literal() {
        let line = r#"<http://example.org/s> <http://example.org/p> "a \"quoted\" word" ."#;
        let result = parse_triple_line(line).unwrap();

        assert_eq!(result.object, r#"a \"quoted\" word"#);
    }

    #[test]
    fn test_parse_malformed_line() {
        assert!(parse_triple_line("not a triple").is_err());
        assert!(parse_triple_line("").is_err());
        assert!(parse_triple_line("<http://example.org/s> missing-rest").is_err());
    }
}
