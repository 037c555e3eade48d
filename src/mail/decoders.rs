//! Text clean-up for the header values and snippets Gmail returns.

/// A `Subject` or `From` value as a reader should see it: RFC 2047
/// encoded-words decoded, folding undone, whitespace runs collapsed.
pub fn header_text(raw: &str) -> String {
    // mailparse only decodes full "Name: value" lines
    let mut line = Vec::with_capacity(raw.len() + 5);
    line.extend_from_slice(b"X: ");
    line.extend_from_slice(raw.as_bytes());
    line.extend_from_slice(b"\r\n");

    let decoded = match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_string(),
    };
    collapse_whitespace(&decoded)
}

/// Snippet as plain text, at most `max_chars` characters.
pub fn snippet_text(raw: &str, max_chars: usize) -> String {
    let text = collapse_whitespace(&unescape_html_entities(raw));
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text,
    }
}

/// Gmail snippets arrive HTML-escaped. `&amp;` goes last so `&amp;lt;`
/// stays `&lt;`.
pub fn unescape_html_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encoded_words_are_decoded() {
        assert_eq!(header_text("=?UTF-8?B?SGVsbG8gd8O2cmxk?="), "Hello wörld");
        assert_eq!(header_text("plain value"), "plain value");
    }

    #[test]
    fn header_whitespace_is_collapsed() {
        assert_eq!(header_text("  Re:\t offer   for you "), "Re: offer for you");
        assert_eq!(header_text("   "), "");
    }

    #[test]
    fn unescapes_gmail_snippet_entities() {
        assert_eq!(
            unescape_html_entities("I&#39;m &quot;in&quot; &amp; ready"),
            "I'm \"in\" & ready"
        );
        assert_eq!(unescape_html_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn snippet_is_flattened_and_truncated() {
        assert_eq!(snippet_text("  a \n\n b  \n c", 100), "a b c");
        assert_eq!(snippet_text("abcdef", 3), "abc");
        assert_eq!(snippet_text("ab cd", 3), "ab");
        assert_eq!(snippet_text("Caf&eacute; ça", 100), "Caf&eacute; ça");
        assert_eq!(snippet_text("ééééé", 2), "éé");
    }
}
