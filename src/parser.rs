//! Finding one article inside a decompressed block.
//!
//! Turning a block into a document model is not this crate's business; a
//! [`DocumentParser`] is whatever the host plugs in. [`PageSliceParser`] is a
//! minimal one for dump XML that returns the raw `<page>` element.

use std::convert::Infallible;

/// Finds the article titled `title` in a block's decompressed bytes.
pub trait DocumentParser {
    type Article;
    type Error: std::error::Error + Send + Sync + 'static;

    /// `Ok(None)` means the block does not contain the article.
    fn find_article(&self, block: &[u8], title: &str) -> Result<Option<Self::Article>, Self::Error>;
}

impl<F, A, E> DocumentParser for F
where
    F: Fn(&[u8], &str) -> Result<Option<A>, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Article = A;
    type Error = E;

    fn find_article(&self, block: &[u8], title: &str) -> Result<Option<A>, E> {
        self(block, title)
    }
}

/// One `<page>` element cut out of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageXml {
    pub title: String,
    /// The element from `<page>` through `</page>`, untouched
    pub xml: String,
}

/// Scans dump XML for the `<page>` whose `<title>` equals the requested one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageSliceParser;

impl DocumentParser for PageSliceParser {
    type Article = PageXml;
    type Error = Infallible;

    fn find_article(&self, block: &[u8], title: &str) -> Result<Option<PageXml>, Infallible> {
        let text = String::from_utf8_lossy(block);
        Ok(pages(&text).find_map(|page| {
            let page_title = element_text(page, "title").map(unescape)?;
            (page_title == title).then(|| PageXml {
                title: page_title,
                xml: page.to_string(),
            })
        }))
    }
}

/// Iterate over complete `<page>...</page>` elements.
fn pages(text: &str) -> impl Iterator<Item = &str> {
    const OPEN: &str = "<page>";
    const CLOSE: &str = "</page>";

    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(OPEN)?;
        let len = rest[start..].find(CLOSE)? + CLOSE.len();
        let page = &rest[start..start + len];
        rest = &rest[start + len..];
        Some(page)
    })
}

fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(&xml[start..start + len])
}

/// Decode the five predefined XML entities and numeric character references.
///
/// Anything that does not decode is kept as written.
fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .and_then(|semi| Some((decode_reference(&rest[1..semi])?, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `name` is the text between `&` and `;`.
fn decode_reference(name: &str) -> Option<char> {
    let code = match name {
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "amp" => return Some('&'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            }
        }
    };
    char::from_u32(code)
}
