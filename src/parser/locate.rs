use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::error::LocateError;
use crate::config::ExtractConfig;

static CLASSED_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[class]").unwrap());

/// Find the unique content container and return the raw text of its first
/// preformatted descendant. Line content is left untouched.
pub fn locate(document: &Html, config: &ExtractConfig) -> Result<String, LocateError> {
    let class = config.container_class.as_str();

    let containers: Vec<ElementRef> = document
        .select(&CLASSED_SEL)
        .filter(|el| is_container(el, class))
        .filter(|el| !has_container_ancestor(el, class))
        .collect();

    let container = match containers.as_slice() {
        [] => {
            return Err(LocateError::NotFound {
                class: class.to_string(),
            })
        }
        [only] => *only,
        many => {
            return Err(LocateError::Ambiguous {
                class: class.to_string(),
                count: many.len(),
            })
        }
    };

    let block = container
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name().eq_ignore_ascii_case(&config.block_tag))
        .ok_or_else(|| LocateError::BlockMissing {
            class: class.to_string(),
            tag: config.block_tag.clone(),
        })?;

    let text: String = block.text().collect();
    if text.is_empty() {
        return Err(LocateError::EmptyBlock {
            class: class.to_string(),
            tag: config.block_tag.clone(),
        });
    }
    Ok(text)
}

/// Parse `html` and run [`locate`] on the result.
pub fn locate_in_html(html: &str, config: &ExtractConfig) -> Result<String, LocateError> {
    let document = Html::parse_document(html);
    locate(&document, config)
}

/// Whole-token class match. Tokens are split on ASCII whitespace only, so a
/// no-break space stays inside a token.
pub fn has_class_token(class_attr: &str, token: &str) -> bool {
    class_attr.split_ascii_whitespace().any(|t| t == token)
}

fn is_container(el: &ElementRef, class: &str) -> bool {
    el.value()
        .attr("class")
        .is_some_and(|attr| has_class_token(attr, class))
}

fn has_container_ancestor(el: &ElementRef, class: &str) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_container(&a, class))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> Result<String, LocateError> {
        locate_in_html(html, &ExtractConfig::default())
    }

    #[test]
    fn class_token_exact() {
        assert!(has_class_token("center-content", "center-content"));
        assert!(has_class_token("main center-content wide", "center-content"));
        assert!(!has_class_token("center-content-wide", "center-content"));
        assert!(!has_class_token("xcenter-content", "center-content"));
        assert!(!has_class_token("", "center-content"));
    }

    #[test]
    fn class_token_irregular_whitespace() {
        assert!(has_class_token("  main\n\t center-content  ", "center-content"));
        assert!(has_class_token("\tcenter-content\r\n", "center-content"));
    }

    #[test]
    fn no_break_space_does_not_split_tokens() {
        assert!(!has_class_token("center-content\u{a0}wide", "center-content"));
        assert!(!has_class_token("\u{a0}center-content", "center-content"));
        assert!(has_class_token("wide\u{c}center-content", "center-content"));
    }

    #[test]
    fn nbsp_joined_class_is_not_a_container() {
        let html = r#"<div class="center-content&nbsp;wide"><pre>x</pre></div>"#;
        assert!(matches!(run(html), Err(LocateError::NotFound { .. })));
    }

    #[test]
    fn returns_exact_pre_text() {
        let html = r#"<html><body>
            <div class="header"><pre>not this</pre></div>
            <div class="center-content"><h2>QPF</h2><pre>  a : b : c
  d : e : f  </pre></div>
        </body></html>"#;
        assert_eq!(run(html).unwrap(), "  a : b : c\n  d : e : f  ");
    }

    #[test]
    fn decodes_entities_and_joins_inline_markup() {
        let html = r#"<div class="center-content"><pre>A &amp; B : <b>Bold</b> : 1/ 2</pre></div>"#;
        assert_eq!(run(html).unwrap(), "A & B : Bold : 1/ 2");
    }

    #[test]
    fn irregular_class_attribute_matches() {
        let html = "<div class=\"  page\n   center-content \"><pre>x</pre></div>";
        assert_eq!(run(html).unwrap(), "x");
    }

    #[test]
    fn substring_class_is_not_a_match() {
        let html = r#"<div class="center-content-wide"><pre>x</pre></div>"#;
        assert!(matches!(run(html), Err(LocateError::NotFound { .. })));
    }

    #[test]
    fn no_container() {
        let html = "<html><body><pre>orphan</pre></body></html>";
        assert_eq!(
            run(html),
            Err(LocateError::NotFound {
                class: "center-content".to_string()
            })
        );
    }

    #[test]
    fn two_containers_are_ambiguous() {
        let html = r#"
            <div class="center-content"><pre>one</pre></div>
            <section class="wide center-content"><pre>two</pre></section>"#;
        assert!(matches!(
            run(html),
            Err(LocateError::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn nested_container_counts_once() {
        let html = r#"
            <div class="center-content">
              <div class="center-content"><pre>inner</pre></div>
            </div>"#;
        assert_eq!(run(html).unwrap(), "inner");
    }

    #[test]
    fn first_pre_in_document_order() {
        let html = r#"<div class="center-content">
            <div><pre>first</pre></div>
            <pre>second</pre>
        </div>"#;
        assert_eq!(run(html).unwrap(), "first");
    }

    #[test]
    fn container_without_pre() {
        let html = r#"<div class="center-content"><p>text</p></div><pre>outside</pre>"#;
        assert!(matches!(run(html), Err(LocateError::BlockMissing { .. })));
    }

    #[test]
    fn empty_pre() {
        let html = r#"<div class="center-content"><pre></pre></div>"#;
        assert!(matches!(run(html), Err(LocateError::EmptyBlock { .. })));
    }

    #[test]
    fn custom_container_and_tag() {
        let config = ExtractConfig {
            container_class: "report".to_string(),
            block_tag: "code".to_string(),
            ..ExtractConfig::default()
        };
        let html = r#"<div class="report"><code>raw</code></div>"#;
        assert_eq!(locate_in_html(html, &config).unwrap(), "raw");
    }

    #[test]
    fn cnrfc_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/cnrfc_qpf.html").unwrap();
        let block = run(&html).unwrap();
        assert!(block.contains("Station Alpha"));
        assert!(!block.contains("Site navigation"));
    }
}
