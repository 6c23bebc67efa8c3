use std::sync::OnceLock;

use regex::Regex;

use receipta_core::{normalize_amount, BlockType, ExtractionResult, TextBlock};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_rupee,
    r"₹\s*([\d,]+(?:\.\d{2})?)");
re!(re_amount_keyword,
    r"amount[\s:]*(\d+(?:,\d+)*(?:\.\d{2})?)");
re!(re_amount_generic,
    r"\d{1,3}(?:,\d{1,3})+(?:\.\d{2})?\b|\d+\.\d{2}\b");

re!(re_bare_txn,
    r"^\d{12}$");
re!(re_utr,
    r"UTR:\s*(\d{12})");
re!(re_labelled_txn,
    r"\b[\w\s.]+:\s*(\d{12})\b");

re!(re_bank,
    r"(?i)\b\w+\s+bank\b|\bbank\s+\w+\b");

/// Timestamp shapes, most specific first. A line matching any of them is a
/// timestamp candidate.
const TIMESTAMP_PATTERNS: &[&str] = &[
    // 12 March 2024, 10:30 AM
    r"\b\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4}\s*,\s*\d{1,2}:\d{2}\s*[APap][Mm]\b",
    // 10:30 AM, 12 March 2024
    r"\b\d{1,2}:\d{2}\s*[APap][Mm],\s*\d{1,2}\s+[A-Za-z]+\s+\d{4}\b",
    // 10:30 PM on 12 Mar 2024
    r"\b\d{1,2}:\d{2}\s*[APap][Mm]\s+on\s+\d{1,2}\s+[A-Za-z]{3,}\s+\d{4}\b",
    // 12 March 2024 at 10:30 AM
    r"\b\d{1,2}\s+[A-Za-z]+\s+\d{4}\s+at\s+\d{1,2}:\d{2}\s*[APap][Mm]\b",
    // 12 Mar 2024 10:30 PM
    r"\b\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4},?\s+\d{1,2}:\d{2}\s*[APap][Mm]\b",
    // 2024-03-12 10:30:00
    r"\b\d{4}[-/]\d{2}[-/]\d{2}\s+\d{2}:\d{2}:\d{2}\b",
    // 12/03/2024 10:30[:00][ PM]
    r"\b\d{1,2}[-/]\d{1,2}[-/]\d{4}\s+\d{1,2}:\d{2}(?::\d{2})?(?:\s*[APap][Mm])?\b",
    // 12 March 2024
    r"\b\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4}\b",
    // 2024-03-12
    r"\b\d{4}[-/]\d{2}[-/]\d{2}\b",
    // 12/03/2024
    r"\b\d{1,2}[-/]\d{1,2}[-/]\d{4}\b",
    // 10:30 AM
    r"\b\d{1,2}:\d{2}\s*[APap][Mm]\b",
    // 22:30:15
    r"\b\d{2}:\d{2}:\d{2}\b",
];

fn timestamp_patterns() -> &'static [Regex] {
    static R: OnceLock<Vec<Regex>> = OnceLock::new();
    R.get_or_init(|| {
        TIMESTAMP_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("invalid regex"))
            .collect()
    })
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Field extractors over the ordered block list of one recognition pass.
///
/// Every extractor is pure and returns `None` when nothing matches. Blocks of
/// the wrong type or without text are skipped, never treated as errors.
pub struct Extractor;

impl Extractor {
    /// Run all four extractors against one pass.
    pub fn extract(blocks: &[TextBlock]) -> ExtractionResult {
        ExtractionResult {
            amount: Self::amount(blocks),
            transaction_id: Self::transaction_id(blocks),
            bank_name: Self::bank_name(blocks),
            timestamp: Self::timestamp(blocks),
        }
    }

    // ── Amount ────────────────────────────────────────────────────────────────

    /// `₹`-anchored amount from WORD blocks. The last block that parses wins;
    /// with no `₹` match at all, falls back to [`Extractor::fallback_amount`].
    pub fn amount(blocks: &[TextBlock]) -> Option<String> {
        let mut amount = None;
        for text in texts_of(blocks, BlockType::Word) {
            if !text.contains('₹') {
                continue;
            }
            match rupee_amount(&strip_spaces(text)) {
                Some(v) => amount = Some(v),
                None => tracing::debug!("Unparseable currency block: {text:?}"),
            }
        }
        amount.or_else(|| Self::fallback_amount(blocks))
    }

    /// First WORD or LINE block with an `amount <number>` label, else the first
    /// currency-shaped number (`1,234.50`, `99.00`). The matched text is
    /// returned verbatim.
    pub fn fallback_amount(blocks: &[TextBlock]) -> Option<String> {
        let candidates = blocks
            .iter()
            .filter(|b| matches!(b.block_type, BlockType::Word | BlockType::Line))
            .filter_map(|b| b.text.as_deref());

        for text in candidates {
            let lower = text.to_lowercase();
            if let Some(c) = re_amount_keyword().captures(&lower) {
                return Some(c[1].to_string());
            }
            if let Some(m) = re_amount_generic().find(&lower) {
                return Some(m.as_str().to_string());
            }
        }
        None
    }

    // ── Transaction ID ────────────────────────────────────────────────────────

    /// Twelve-digit reference. WORD blocks are searched first, for a bare
    /// 12-digit token and then a `UTR:` label; only when no word qualifies are
    /// LINE blocks searched for any `<label>: <12 digits>`.
    pub fn transaction_id(blocks: &[TextBlock]) -> Option<String> {
        for text in texts_of(blocks, BlockType::Word) {
            let cleaned = strip_spaces(text);
            if re_bare_txn().is_match(&cleaned) {
                return Some(cleaned);
            }
            if let Some(c) = re_utr().captures(&cleaned) {
                return Some(c[1].to_string());
            }
        }

        texts_of(blocks, BlockType::Line).find_map(|text| {
            let cleaned = strip_spaces(text);
            re_labelled_txn()
                .captures(&cleaned)
                .map(|c| c[1].to_string())
        })
    }

    // ── Bank name ─────────────────────────────────────────────────────────────

    /// Raw text of the first LINE mentioning `<word> bank` or `bank <word>`.
    pub fn bank_name(blocks: &[TextBlock]) -> Option<String> {
        texts_of(blocks, BlockType::Line)
            .find(|text| re_bank().is_match(text))
            .map(str::to_string)
    }

    // ── Timestamp ─────────────────────────────────────────────────────────────

    /// Longest LINE matching any timestamp pattern; ties go to the earlier
    /// line. The whole line is returned, not just the matched part.
    pub fn timestamp(blocks: &[TextBlock]) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for text in texts_of(blocks, BlockType::Line) {
            if !timestamp_patterns().iter().any(|re| re.is_match(text)) {
                continue;
            }
            let len = text.chars().count();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((text, len));
            }
        }
        best.map(|(text, _)| text.to_string())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn texts_of(blocks: &[TextBlock], block_type: BlockType) -> impl Iterator<Item = &str> {
    blocks.iter().filter_map(move |b| b.text_of(block_type))
}

fn strip_spaces(text: &str) -> String {
    text.chars().filter(|c| *c != ' ').collect()
}

fn rupee_amount(text: &str) -> Option<String> {
    let c = re_rupee().captures(text)?;
    normalize_amount(c.get(1)?.as_str())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
