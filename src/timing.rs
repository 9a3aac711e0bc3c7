//! Phase timing for the command layer.

use std::time::Instant;

/// Measures one phase; the elapsed time goes to stderr on `finish`.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            eprintln!("  [{:.1}m] {}", secs / 60.0, self.name);
        } else {
            eprintln!("  [{:.1}s] {}", secs, self.name);
        }
    }
}
