use crate::ResultRow;

/// Cuts the final `[start, start + max)` page out of a fully merged set. `max == 0` keeps
/// everything from `start` on.
pub fn slice(rows: Vec<ResultRow>, start: usize, max: usize) -> Vec<ResultRow> {
	if start >= rows.len() {
		return Vec::new();
	}

	let end = if max == 0 { rows.len() } else { start.saturating_add(max).min(rows.len()) };

	rows.into_iter().skip(start).take(end - start).collect()
}
