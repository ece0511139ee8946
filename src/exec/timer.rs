//! Labelled wall-clock timers around setup, each calculation phase, and
//! output writing.

use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    key: String,
    description: String,
    started: Option<Instant>,
    total: Duration,
}

/// A small ordered set of named timers. Starting an unknown key registers
/// it on the fly so ad-hoc phases do not need pre-declaration.
#[derive(Debug, Default)]
pub struct Timers {
    entries: Vec<Entry>,
}

impl Timers {
    pub fn new() -> Timers {
        Timers::default()
    }

    pub fn add(&mut self, key: &str, description: &str) {
        if self.entries.iter().any(|e| e.key == key) {
            return;
        }
        self.entries.push(Entry {
            key: key.to_string(),
            description: description.to_string(),
            started: None,
            total: Duration::ZERO,
        });
    }

    pub fn start(&mut self, key: &str) {
        if !self.entries.iter().any(|e| e.key == key) {
            self.add(key, key);
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == key)
            .expect("just registered");
        entry.started = Some(Instant::now());
    }

    pub fn stop(&mut self, key: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            if let Some(started) = entry.started.take() {
                entry.total += started.elapsed();
            }
        }
    }

    /// `(description, formatted duration)` pairs in registration order,
    /// for the timing block of the log and the info file.
    pub fn report(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.description.clone(), human_duration(e.total)))
            .collect()
    }

    /// Fold another rank's timers into this one (totals add up).
    pub fn merge_max(&mut self, other: &Timers) {
        for o in &other.entries {
            match self.entries.iter_mut().find(|e| e.key == o.key) {
                Some(e) => e.total = e.total.max(o.total),
                None => self.entries.push(Entry {
                    key: o.key.clone(),
                    description: o.description.clone(),
                    started: None,
                    total: o.total,
                }),
            }
        }
    }
}

/// Render a duration as `XdYhZmW.mmm s`, dropping the leading zero units.
pub fn human_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    let ms = total_ms % 1000;
    let secs = (total_ms / 1000) % 60;
    let mins = (total_ms / 60_000) % 60;
    let hours = (total_ms / 3_600_000) % 24;
    let days = total_ms / 86_400_000;
    if days > 0 {
        format!("{}d{}h{}m{}.{:03}s", days, hours, mins, secs, ms)
    } else if hours > 0 {
        format!("{}h{}m{}.{:03}s", hours, mins, secs, ms)
    } else if mins > 0 {
        format!("{}m{}.{:03}s", mins, secs, ms)
    } else {
        format!("{}.{:03}s", secs, ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_compactly() {
        assert_eq!(human_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(human_duration(Duration::from_secs(61)), "1m1.000s");
        assert_eq!(human_duration(Duration::from_secs(3661)), "1h1m1.000s");
        assert_eq!(human_duration(Duration::from_secs(90_061)), "1d1h1m1.000s");
    }

    #[test]
    fn timers_accumulate_and_merge() {
        let mut a = Timers::new();
        a.add("calc", "Total calculation time:");
        a.start("calc");
        a.stop("calc");
        let mut b = Timers::new();
        b.start("calc");
        b.stop("calc");
        a.merge_max(&b);
        assert_eq!(a.report().len(), 1);
        assert_eq!(a.report()[0].0, "Total calculation time:");
    }
}
