//! Result filter and tokenizer / 结果过滤与分词
//!
//! Normalizes free-text queries and result display strings so they can be
//! compared byte-wise: / 将查询与结果字符串归一化后做子串比较：
//! - HTML tag and entity stripping / 去除 HTML 标签与实体
//! - Noise and punctuation removal / 去除噪声词与标点
//! - NFKD decomposition with accent folding / NFKD 分解并去除变音符号
//!
//! Matching is AND-semantics substring containment, no scoring.
//! 匹配采用全词命中的子串包含语义，不做打分。

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::schema::RawResult;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static HTML_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)&[a-z#0-9]+;").unwrap());
// 噪声词与标点集合，统一替换为空格
static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.torrent|www\.|\.com|\.net|[\\/%_;\-.()\[\]\n\rÐ&~{}*@^'=!,¡|#ÀÁ]").unwrap()
});
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip HTML tags and entities / 去除 HTML 标签与实体
pub fn strip_html(text: &str) -> String {
    let no_tags = HTML_TAG.replace_all(text, "");
    HTML_ENTITY.replace_all(&no_tags, "").into_owned()
}

/// Strip HTML, drop noise words and punctuation, collapse whitespace
/// 去除 HTML、噪声词和标点，并压缩空白
pub fn sanitize(text: &str) -> String {
    let stripped = strip_html(text);
    let cleaned = NOISE.replace_all(&stripped, " ");
    SPACES.replace_all(&cleaned, " ").trim().to_string()
}

/// Canonical decomposition, accent folding and lower-casing
/// 规范分解、去除变音符号并转小写
///
/// `normalize("Café")` and `normalize("Cafe")` yield the same value.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Tokenize a query into a deduplicated set of normalized tokens
/// 将查询切分为去重后的归一化词元
pub fn tokenize(keywords: &str) -> Vec<String> {
    let sanitized = sanitize(keywords);
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for word in sanitized.split_whitespace() {
        let norm = normalize(word);
        if norm.is_empty() {
            continue;
        }
        if seen.insert(norm.clone()) {
            tokens.push(norm);
        }
    }
    tokens
}

/// Haystack for matching: display name, crawl-parent display name and
/// filename, run through the same pipeline as the query tokens.
/// 匹配用的干草堆：结果名、父结果名与文件名，经过与查询相同的归一化。
fn haystack(result: &RawResult) -> String {
    let mut text = String::new();
    text.push_str(&result.display_name);
    if let Some(parent) = result.crawl_parent() {
        text.push(' ');
        text.push_str(&parent.display_name);
    }
    if let Some(filename) = result.filename() {
        text.push(' ');
        text.push_str(filename);
    }
    normalize(&sanitize(&text))
}

/// AND-semantics match: every token must appear as a substring.
/// An empty token set matches nothing. / 全部词元命中才算匹配，空词元集不匹配。
pub fn matches(tokens: &[String], result: &RawResult) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let hay = haystack(result);
    tokens.iter().all(|token| hay.contains(token.as_str()))
}

/// Filter one delivered batch. A malformed result that panics while being
/// stringified aborts the whole batch to empty instead of unwinding into
/// the delivery pipeline. / 过滤单个批次，畸形结果导致整批置空而不向上传播。
pub fn filter_batch(tokens: &[String], results: &[RawResult]) -> Vec<RawResult> {
    if results.is_empty() {
        return Vec::new();
    }
    catch_unwind(AssertUnwindSafe(|| {
        results
            .iter()
            .filter(|result| matches(tokens, result))
            .cloned()
            .collect()
    }))
    .unwrap_or_default()
}
