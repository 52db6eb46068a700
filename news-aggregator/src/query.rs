use crate::rss_utils::feed::extract_text_from_html;
use crate::types::Article;
use std::borrow::Cow;

/// Case-insensitive substring filter over title, source label and the plain
/// text of the description (or content when there is no description).
///
/// A blank query borrows the input as is. Otherwise matching articles are
/// returned in their original order.
pub fn filter<'a>(articles: &'a [Article], query: &str) -> Cow<'a, [Article]> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Cow::Borrowed(articles);
    }

    Cow::Owned(
        articles
            .iter()
            .filter(|article| is_match(article, &needle))
            .cloned()
            .collect(),
    )
}

fn is_match(article: &Article, needle: &str) -> bool {
    if article.title.to_lowercase().contains(needle)
        || article.source_label.to_lowercase().contains(needle)
    {
        return true;
    }

    let body = if article.description.is_empty() {
        &article.content
    } else {
        &article.description
    };
    extract_text_from_html(body).to_lowercase().contains(needle)
}
