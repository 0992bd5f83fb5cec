use scraper::{Html, Node, Selector};

/// Plain text pulled out of one HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub title: Option<String>,
    pub text: String,
}

/// Title from `<title>`, body text from every text node under `<body>`
/// except script/style contents, whitespace collapsed.
pub fn extract_html(raw: &str) -> ExtractedText {
    let doc = Html::parse_document(raw);
    let sel_title = Selector::parse("title").expect("valid selector");
    let sel_body = Selector::parse("body").expect("valid selector");

    let title = doc
        .select(&sel_title)
        .next()
        .map(|n| collapse_whitespace(&n.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = doc.select(&sel_body).next().unwrap_or_else(|| doc.root_element());
    let mut text = String::new();
    for node in root.descendants() {
        let Node::Text(chunk) = node.value() else { continue };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if hidden { continue; }
        text.push_str(chunk);
        text.push(' ');
    }

    ExtractedText { title, text: collapse_whitespace(&text) }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_visible_text() {
        let html = r#"<html><head><title> My  Page </title><style>p { color: red }</style></head>
            <body><h1>Hello</h1><p>world <b>wide</b></p><script>var x = 1;</script></body></html>"#;
        let out = extract_html(html);
        assert_eq!(out.title.as_deref(), Some("My Page"));
        assert_eq!(out.text, "Hello world wide");
    }

    #[test]
    fn plain_text_has_no_title() {
        let out = extract_html("just some words");
        assert_eq!(out.title, None);
        assert_eq!(out.text, "just some words");
    }
}
