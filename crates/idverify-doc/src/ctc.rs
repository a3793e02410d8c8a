//! Greedy CTC decoding for CRNN recognition output.

use std::path::Path;

/// Character set of a recognition model. Class 0 is the CTC blank;
/// class `i` maps to `chars[i - 1]`.
#[derive(Debug, Clone)]
pub struct CharDictionary {
    chars: Vec<String>,
}

impl CharDictionary {
    /// One symbol per line, optionally followed by a space class.
    pub fn from_text(text: &str, with_space: bool) -> Self {
        let mut chars: Vec<String> = text
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if with_space {
            chars.push(" ".to_string());
        }
        Self { chars }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_text(&std::fs::read_to_string(path)?, true))
    }

    /// Number of model classes including the blank.
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    fn symbol(&self, class: usize) -> Option<&str> {
        class.checked_sub(1).and_then(|i| self.chars.get(i)).map(String::as_str)
    }
}

/// Decoded text with the mean probability of its kept symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub confidence: f32,
}

/// Decode a `[steps, classes]` probability matrix (row-major).
///
/// Takes the argmax per step, collapses repeats and drops blanks.
pub fn greedy_decode(probs: &[f32], classes: usize, dict: &CharDictionary) -> Decoded {
    let mut text = String::new();
    let mut total = 0.0f32;
    let mut kept = 0usize;
    let mut previous = 0usize;

    if classes > 0 {
        for step in probs.chunks_exact(classes) {
            let (best, p) = step
                .iter()
                .copied()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });

            if best != 0 && best != previous {
                if let Some(sym) = dict.symbol(best) {
                    text.push_str(sym);
                    total += p;
                    kept += 1;
                }
            }
            previous = best;
        }
    }

    Decoded {
        text: text.trim().to_string(),
        confidence: if kept > 0 { total / kept as f32 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> CharDictionary {
        CharDictionary::from_text("a\nb\nc\n", true)
    }

    fn one_hot(seq: &[usize], classes: usize) -> Vec<f32> {
        seq.iter()
            .flat_map(|&c| (0..classes).map(move |i| if i == c { 0.9 } else { 0.1 / classes as f32 }))
            .collect()
    }

    #[test]
    fn dictionary_counts_blank_and_space() {
        assert_eq!(dict().num_classes(), 5);
        assert_eq!(dict().symbol(0), None);
        assert_eq!(dict().symbol(1), Some("a"));
        assert_eq!(dict().symbol(4), Some(" "));
    }

    #[test]
    fn collapses_repeats_and_blanks() {
        // a a _ a b b _ _ c
        let probs = one_hot(&[1, 1, 0, 1, 2, 2, 0, 0, 3], 5);
        let out = greedy_decode(&probs, 5, &dict());
        assert_eq!(out.text, "aabc");
        assert!((out.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn space_class_splits_words() {
        let probs = one_hot(&[1, 4, 2], 5);
        assert_eq!(greedy_decode(&probs, 5, &dict()).text, "a b");
    }

    #[test]
    fn all_blank_is_empty() {
        let probs = one_hot(&[0, 0, 0], 5);
        let out = greedy_decode(&probs, 5, &dict());
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn devanagari_symbols_decode() {
        let d = CharDictionary::from_text("र\nा\nम\n", false);
        let probs = one_hot(&[1, 2, 3], 4);
        assert_eq!(greedy_decode(&probs, 4, &d).text, "राम");
    }
}
