//! Truncation of degenerate repeated output

use tracing::warn;

/// Shortest phrase considered a loop, in characters
pub const DEFAULT_MIN_PHRASE_CHARS: usize = 20;

/// Back-to-back copies tolerated before the output counts as a loop
pub const DEFAULT_MAX_REPEATS: usize = 3;

/// Detects model output stuck repeating one phrase and cuts it off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionGuard {
    min_phrase_chars: usize,
    max_repeats: usize,
}

impl RepetitionGuard {
    pub fn new(min_phrase_chars: usize, max_repeats: usize) -> Self {
        Self {
            min_phrase_chars: min_phrase_chars.max(1),
            max_repeats: max_repeats.max(1),
        }
    }

    /// Return the cleaned text and whether anything was cut.
    ///
    /// A loop is a phrase of at least `min_phrase_chars` characters occurring
    /// more than `max_repeats` times back to back. The earliest loop wins and
    /// the output is cut right after its first occurrence.
    pub fn clean(&self, text: &str) -> (String, bool) {
        let chars: Vec<char> = text.chars().collect();

        match self.find_loop(&chars) {
            Some((start, period)) => {
                let kept: String = chars[..start + period].iter().collect();
                let kept = kept.trim_end().to_string();
                let removed = chars.len() - kept.chars().count();
                warn!(
                    "Repetition detected and removed: {} chars ({}% of output)",
                    removed,
                    removed * 100 / chars.len().max(1)
                );
                (kept, true)
            }
            None => (text.to_string(), false),
        }
    }

    /// Earliest `(start, period)` whose phrase repeats more than `max_repeats` times
    fn find_loop(&self, chars: &[char]) -> Option<(usize, usize)> {
        let copies = self.max_repeats + 1;
        let n = chars.len();
        let mut best: Option<(usize, usize)> = None;

        let mut period = self.min_phrase_chars;
        while period * copies <= n {
            // A run of `period * max_repeats` positions where chars[i] == chars[i + period]
            // means the phrase starting at the run's head occurs `copies` times.
            let needed = period * self.max_repeats;
            let mut run = 0;
            for i in 0..n - period {
                // the current run starts at i - run; nothing earlier can follow
                if best.is_some_and(|(start, _)| i - run > start) {
                    break;
                }
                if chars[i] == chars[i + period] {
                    run += 1;
                    if run == needed {
                        let start = i + 1 - needed;
                        if best.map_or(true, |(s, _)| start < s) {
                            best = Some((start, period));
                        }
                        break;
                    }
                } else {
                    run = 0;
                }
            }
            period += 1;
        }

        best
    }
}

impl Default for RepetitionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PHRASE_CHARS, DEFAULT_MAX_REPEATS)
    }
}
