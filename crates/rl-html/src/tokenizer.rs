//! Byte-level HTML tokenizer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Doctype(String),
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
    Comment(String),
}

/// How the contents of an element are tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextMode {
    Markup,
    /// Verbatim until the matching end tag (`script`, `style`).
    Raw,
    /// Like `Raw`, but character references are decoded (`textarea`, `title`).
    EscapableRaw,
}

pub(crate) fn text_mode(tag: &str) -> TextMode {
    match tag {
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" => TextMode::Raw,
        "textarea" | "title" => TextMode::EscapableRaw,
        _ => TextMode::Markup,
    }
}

pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if starts_with(bytes, i, b"<!--") {
            let (comment, next) = read_comment(bytes, i);
            out.push(Token::Comment(comment));
            i = next;
            continue;
        }

        if bytes[i] == b'<' {
            if starts_with(bytes, i, b"</") {
                if let Some((tok, next)) = parse_end_tag(bytes, i) {
                    out.push(tok);
                    i = next;
                    continue;
                }
            } else if starts_with(bytes, i, b"<!") {
                let (decl, next) = read_declaration(bytes, i);
                if let Some(name) = doctype_name(&decl) {
                    out.push(Token::Doctype(name));
                }
                i = next;
                continue;
            } else if let Some((tok, next)) = parse_start_tag(bytes, i) {
                let mut raw_text_tag: Option<(String, TextMode)> = None;
                if let Token::Start {
                    name, self_closing, ..
                } = &tok
                {
                    let mode = text_mode(name);
                    if !*self_closing && mode != TextMode::Markup {
                        raw_text_tag = Some((name.clone(), mode));
                    }
                }

                out.push(tok);
                i = next;

                if let Some((tag_name, mode)) = raw_text_tag {
                    let (raw_text, closing_end) = parse_raw_text_until_end_tag(bytes, i, &tag_name);
                    if !raw_text.is_empty() {
                        let text = match mode {
                            TextMode::EscapableRaw => decode_entities(&raw_text),
                            _ => raw_text,
                        };
                        out.push(Token::Text(text));
                    }

                    if let Some(closing_end) = closing_end {
                        out.push(Token::End { name: tag_name });
                        i = closing_end;
                    } else {
                        i = bytes.len();
                    }
                }

                continue;
            }
        }

        let (txt, next) = parse_text(bytes, i);
        if !txt.is_empty() {
            out.push(Token::Text(decode_entities(&txt)));
        }
        i = next;
    }

    out
}

pub(crate) fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';') else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        let entity = &input[(amp + 1)..semi];
        if let Some(decoded) = decode_entity(entity) {
            out.push(decoded);
            cursor = semi + 1;
        } else {
            out.push('&');
            cursor = amp + 1;
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "copy" => Some('\u{a9}'),
        "hellip" => Some('\u{2026}'),
        "mdash" => Some('\u{2014}'),
        "ndash" => Some('\u{2013}'),
        _ => {
            let value = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(value)
        }
    }
}

fn starts_with(bytes: &[u8], i: usize, pat: &[u8]) -> bool {
    let end = i.saturating_add(pat.len());
    end <= bytes.len() && &bytes[i..end] == pat
}

fn read_comment(bytes: &[u8], start: usize) -> (String, usize) {
    let body_start = start.saturating_add(4);
    let mut i = body_start;
    while i + 2 < bytes.len() {
        if bytes[i] == b'-' && bytes[i + 1] == b'-' && bytes[i + 2] == b'>' {
            let text = String::from_utf8_lossy(&bytes[body_start..i]).to_string();
            return (text, i + 3);
        }
        i += 1;
    }

    let body_start = body_start.min(bytes.len());
    (
        String::from_utf8_lossy(&bytes[body_start..]).to_string(),
        bytes.len(),
    )
}

fn read_declaration(bytes: &[u8], start: usize) -> (String, usize) {
    let body_start = start + 2;
    let mut i = body_start;
    while i < bytes.len() {
        if bytes[i] == b'>' {
            return (
                String::from_utf8_lossy(&bytes[body_start..i]).to_string(),
                i + 1,
            );
        }
        i += 1;
    }
    (
        String::from_utf8_lossy(&bytes[body_start.min(bytes.len())..]).to_string(),
        bytes.len(),
    )
}

fn doctype_name(declaration: &str) -> Option<String> {
    let mut parts = declaration.split_whitespace();
    let keyword = parts.next()?;
    if !keyword.eq_ignore_ascii_case("doctype") {
        return None;
    }
    Some(parts.next().unwrap_or("html").to_ascii_lowercase())
}

fn parse_text(bytes: &[u8], start: usize) -> (String, usize) {
    // A `<` that did not open a tag is literal text.
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != b'<' {
        i += 1;
    }
    (String::from_utf8_lossy(&bytes[start..i]).to_string(), i)
}

fn parse_raw_text_until_end_tag(
    bytes: &[u8],
    start: usize,
    tag_name: &str,
) -> (String, Option<usize>) {
    let tag_bytes = tag_name.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        if bytes[i] != b'<' || i + 2 + tag_bytes.len() > bytes.len() || bytes[i + 1] != b'/' {
            i = i.saturating_add(1);
            continue;
        }

        let name_start = i + 2;
        let name_end = name_start + tag_bytes.len();
        if !bytes[name_start..name_end].eq_ignore_ascii_case(tag_bytes) {
            i = i.saturating_add(1);
            continue;
        }

        let mut close = name_end;
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close = close.saturating_add(1);
        }

        if close < bytes.len() && bytes[close] == b'>' {
            let text = String::from_utf8_lossy(&bytes[start..i]).to_string();
            return (text, Some(close + 1));
        }

        i = i.saturating_add(1);
    }

    (String::from_utf8_lossy(&bytes[start..]).to_string(), None)
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 2;
    skip_spaces(bytes, &mut i);
    let begin = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i == begin {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..i]).to_ascii_lowercase();
    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    Some((Token::End { name }, i + 1))
}

fn parse_start_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 1;
    let begin = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i == begin || !bytes[begin].is_ascii_alphabetic() {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..i]).to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        skip_spaces(bytes, &mut i);
        if i >= bytes.len() {
            return None;
        }

        if bytes[i] == b'>' {
            i += 1;
            break;
        }

        if bytes[i] == b'/' {
            i += 1;
            skip_spaces(bytes, &mut i);
            if i < bytes.len() && bytes[i] == b'>' {
                self_closing = true;
                i += 1;
                break;
            }
            continue;
        }

        let a_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if i == a_start {
            // Unparseable attribute byte: skip it rather than abandoning the tag.
            i += 1;
            continue;
        }

        let a_name = String::from_utf8_lossy(&bytes[a_start..i]).to_ascii_lowercase();
        skip_spaces(bytes, &mut i);

        let mut val = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            skip_spaces(bytes, &mut i);
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let q = bytes[i];
                i += 1;
                let v_start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                val = String::from_utf8_lossy(&bytes[v_start..i]).to_string();
                if i < bytes.len() && bytes[i] == q {
                    i += 1;
                }
            } else {
                let v_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                val = String::from_utf8_lossy(&bytes[v_start..i]).to_string();
            }
        }

        // Duplicate attributes keep the first occurrence.
        if !attrs.iter().any(|(existing, _)| *existing == a_name) {
            attrs.push((a_name, decode_entities(&val)));
        }
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
        },
        i,
    ))
}

fn skip_spaces(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn is_attr_name_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'/' | b'>' | b'=' | b'"' | b'\'' | b'<')
}

#[cfg(test)]
mod tests {
    use super::Token;
    use super::decode_entities;
    use super::tokenize;

    #[test]
    fn tokenizes_attributes_in_all_quote_styles() {
        let tokens = tokenize(r#"<slot name="a" data-x='b' data-y=c hidden>"#);
        assert_eq!(
            tokens,
            vec![Token::Start {
                name: "slot".to_owned(),
                attrs: vec![
                    ("name".to_owned(), "a".to_owned()),
                    ("data-x".to_owned(), "b".to_owned()),
                    ("data-y".to_owned(), "c".to_owned()),
                    ("hidden".to_owned(), String::new()),
                ],
                self_closing: false,
            }]
        );
    }

    #[test]
    fn unquoted_attribute_keeps_slashes() {
        let tokens = tokenize("<script data-path=/layout.html></script>");
        let Some(Token::Start { attrs, .. }) = tokens.first() else {
            panic!("expected start tag, got {tokens:?}");
        };
        assert_eq!(attrs[0], ("data-path".to_owned(), "/layout.html".to_owned()));
    }

    #[test]
    fn script_body_is_not_tokenized_as_markup() {
        let tokens = tokenize("<script>if (a < b) { x = '<slot>' }</script>");
        assert_eq!(
            tokens[1],
            Token::Text("if (a < b) { x = '<slot>' }".to_owned())
        );
        assert_eq!(
            tokens[2],
            Token::End {
                name: "script".to_owned()
            }
        );
    }

    #[test]
    fn keeps_comments_and_doctype() {
        let tokens = tokenize("<!DOCTYPE html><!-- note --><p>");
        assert_eq!(tokens[0], Token::Doctype("html".to_owned()));
        assert_eq!(tokens[1], Token::Comment(" note ".to_owned()));
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        let tokens = tokenize("1 < 2");
        assert_eq!(
            tokens,
            vec![Token::Text("1 ".to_owned()), Token::Text("< 2".to_owned())]
        );
    }

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(decode_entities("a &amp; b &#60; &#x3e; &bogus;"), "a & b < > &bogus;");
    }
}
