use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
	pub trigger: String,
	/// Text after the trigger with surrounding whitespace and punctuation stripped. May be empty.
	pub content: String,
}

/// Matches "remember" style command prefixes. Longer triggers are tried first so
/// "remember this" wins over "remember".
#[derive(Debug, Clone)]
pub struct TriggerSet {
	patterns: Vec<(String, Regex)>,
}
impl TriggerSet {
	pub fn new<I, S>(triggers: I) -> Result<Self, regex::Error>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut normalized: Vec<String> = triggers
			.into_iter()
			.map(|trigger| trigger.as_ref().trim().to_lowercase())
			.filter(|trigger| !trigger.is_empty())
			.collect();

		normalized.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
		normalized.dedup();

		let mut patterns = Vec::with_capacity(normalized.len());

		for trigger in normalized {
			let words: Vec<String> = trigger.split_whitespace().map(regex::escape).collect();
			let pattern = format!(r"(?i)^\s*{}\b", words.join(r"\s+"));

			patterns.push((trigger, Regex::new(&pattern)?));
		}

		Ok(Self { patterns })
	}

	pub fn detect(&self, text: &str) -> Option<TriggerMatch> {
		for (trigger, pattern) in &self.patterns {
			let Some(found) = pattern.find(text) else { continue };

			return Some(TriggerMatch {
				trigger: trigger.clone(),
				content: strip_surrounding(&text[found.end()..]).to_string(),
			});
		}

		None
	}
}

fn strip_surrounding(text: &str) -> &str {
	text.trim_matches(|ch: char| ch.is_whitespace() || ch.is_ascii_punctuation())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn triggers() -> TriggerSet {
		TriggerSet::new(["hey jarvice remember", "hey jarvice remember this", "remember this"])
			.expect("Failed to build triggers.")
	}

	#[test]
	fn strips_trigger_and_punctuation() {
		let found = triggers()
			.detect("hey jarvice remember this: the sky is blue")
			.expect("Expected a trigger match.");

		assert_eq!(found.trigger, "hey jarvice remember this");
		assert_eq!(found.content, "the sky is blue");
	}

	#[test]
	fn bare_trigger_has_empty_content() {
		let found = triggers().detect("hey jarvice remember this").expect("Expected a match.");

		assert!(found.content.is_empty());
	}

	#[test]
	fn matching_is_case_insensitive_and_whitespace_tolerant() {
		let found = triggers()
			.detect("  Hey  Jarvice REMEMBER, buy milk.")
			.expect("Expected a trigger match.");

		assert_eq!(found.trigger, "hey jarvice remember");
		assert_eq!(found.content, "buy milk");
	}

	#[test]
	fn ignores_triggers_inside_words_or_mid_sentence() {
		let set = triggers();

		assert!(set.detect("remember thistles bloom").is_none());
		assert!(set.detect("please remember this").is_none());
	}
}
