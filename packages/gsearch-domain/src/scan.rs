//! Depth- and quote-aware scanning of loosely structured query text.
//!
//! Only text outside parentheses and string literals counts as top level. Nothing here
//! understands the query beyond that.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Word<'a> {
	pub(crate) start: usize,
	pub(crate) end: usize,
	pub(crate) text: &'a str,
}
impl Word<'_> {
	pub(crate) fn is(&self, keyword: &str) -> bool {
		self.text.eq_ignore_ascii_case(keyword)
	}
}

/// Top-level words in order of appearance. A word is a run of alphanumerics, '_' and '.'.
pub(crate) fn top_level_words(text: &str) -> Vec<Word<'_>> {
	let mut words = Vec::new();
	let mut depth = 0_usize;
	let mut quote: Option<char> = None;
	let mut current: Option<usize> = None;

	for (idx, ch) in text.char_indices() {
		if let Some(open) = quote {
			if ch == open {
				quote = None;
			}

			continue;
		}

		let in_word = depth == 0 && is_word_char(ch);

		match (current, in_word) {
			(None, true) => current = Some(idx),
			(Some(start), false) => {
				words.push(Word { start, end: idx, text: &text[start..idx] });
				current = None;
			},
			_ => {},
		}

		match ch {
			'\'' | '"' | '`' => quote = Some(ch),
			'(' => depth += 1,
			')' => depth = depth.saturating_sub(1),
			_ => {},
		}
	}

	if let Some(start) = current {
		words.push(Word { start, end: text.len(), text: &text[start..] });
	}

	words
}

/// Splits on `separator` occurrences that sit at top level.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0_usize;
	let mut quote: Option<char> = None;
	let mut start = 0;

	for (idx, ch) in text.char_indices() {
		if let Some(open) = quote {
			if ch == open {
				quote = None;
			}

			continue;
		}

		match ch {
			'\'' | '"' | '`' => quote = Some(ch),
			'(' => depth += 1,
			')' => depth = depth.saturating_sub(1),
			_ if ch == separator && depth == 0 => {
				parts.push(&text[start..idx]);
				start = idx + ch.len_utf8();
			},
			_ => {},
		}
	}

	parts.push(&text[start..]);

	parts
}

/// Position of the last top-level `order by` pair, as (start of "order", end of "by").
pub(crate) fn last_order_by(words: &[Word<'_>]) -> Option<(usize, usize)> {
	words
		.windows(2)
		.rev()
		.find(|pair| pair[0].is("order") && pair[1].is("by"))
		.map(|pair| (pair[0].start, pair[1].end))
}

fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_' || ch == '.'
}
