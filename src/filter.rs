use crate::city::City;
use std::time::{Duration, Instant};

/// Cities whose name contains `term`, ignoring case, in collection order.
/// An empty term keeps everything.
pub fn filter(all: &[City], term: &str) -> Vec<City> {
    let term = term.to_lowercase();
    all.iter().filter(|city| city.name.to_lowercase().contains(&term)).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExactMatch<'a> {
    NotFound,
    Unique(&'a City),
    /// Several cities share the name; nothing is picked.
    Ambiguous(usize),
}

/// Case-insensitive whole-name lookup used by search submission.
pub fn find_exact<'a>(cities: &'a [City], term: &str) -> ExactMatch<'a> {
    let term = term.to_lowercase();
    let mut found = cities.iter().filter(|city| city.name.to_lowercase() == term);
    match (found.next(), found.count()) {
        (None, _) => ExactMatch::NotFound,
        (Some(city), 0) => ExactMatch::Unique(city),
        (Some(_), more) => ExactMatch::Ambiguous(more + 1),
    }
}

/// Holds the latest search text and decides when it should be applied.
///
/// With a zero debounce every input is due immediately.
#[derive(Debug, Clone)]
pub struct FilterController {
    term: String,
    debounce: Duration,
    dirty_since: Option<Instant>,
}

impl FilterController {
    pub fn new(debounce: Duration) -> Self {
        Self { term: String::new(), debounce, dirty_since: None }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn input(&mut self, text: &str, now: Instant) {
        if self.term != text {
            self.term.clear();
            self.term.push_str(text);
        }
        // Debounce restarts on every keystroke.
        self.dirty_since = Some(now);
    }

    /// Returns the term once it is due, at most once per input burst.
    pub fn take_due(&mut self, now: Instant) -> Option<&str> {
        let since = self.dirty_since?;
        if now.saturating_duration_since(since) < self.debounce {
            return None;
        }
        self.dirty_since = None;
        Some(&self.term)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }
}
