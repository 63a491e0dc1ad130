//! Concrete progress sinks.

use std::io::{self, Write};
use std::sync::Mutex;

use super::ProgressSink;

/// Width of the terminal bar in cells.
const BAR_WIDTH: usize = 40;

/// Renders a single carriage-return-updated progress bar on stdout.
///
/// ```text
/// [====================>                   ]  50%
/// ```
///
/// Redraws are suppressed while the integer percent is unchanged, which
/// keeps the bar flicker-free under bursts of fractional events. The
/// last-rendered percent and the terminal write form one critical section
/// so concurrent advancement from worker threads cannot interleave
/// partial redraws.
pub struct TerminalProgress {
    last_percent: Mutex<i32>,
}

impl TerminalProgress {
    /// Create a sink that has rendered nothing yet.
    pub fn new() -> Self {
        Self {
            last_percent: Mutex::new(-1),
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn advance(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let percent = (fraction * 100.0).floor() as i32;

        let mut last = self.last_percent.lock().unwrap();
        if percent == *last {
            return;
        }
        *last = percent;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let _ = out.write_all(render_bar(fraction, percent).as_bytes());
        let _ = out.flush();
        if percent >= 100 {
            let _ = out.write_all(b"\n");
        }
    }
}

/// Draw the fixed-width bar line for the given fraction.
fn render_bar(fraction: f64, percent: i32) -> String {
    let filled = ((fraction * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);

    let mut line = String::with_capacity(BAR_WIDTH + 16);
    line.push_str("\r[");
    for i in 0..BAR_WIDTH {
        if i < filled {
            line.push('=');
        } else if i == filled {
            line.push('>');
        } else {
            line.push(' ');
        }
    }
    line.push_str(&format!("] {percent:>3}% "));
    line
}

/// A sink that discards all events; for tests and non-interactive runs.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn advance(&self, _fraction: f64) {}
}

/// Machine-readable sink emitting one JSON object per rendered percent.
///
/// Each line has the shape `{"progress":0.42}`. The same integer-percent
/// deduplication as the terminal sink applies, so consumers see at most
/// 101 lines per run.
pub struct JsonLinesProgress<W: Write + Send> {
    state: Mutex<JsonState<W>>,
}

struct JsonState<W> {
    last_percent: i32,
    writer: W,
}

impl<W: Write + Send> JsonLinesProgress<W> {
    /// Create a sink writing JSON lines to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(JsonState {
                last_percent: -1,
                writer,
            }),
        }
    }
}

impl<W: Write + Send> ProgressSink for JsonLinesProgress<W> {
    fn advance(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let percent = (fraction * 100.0).floor() as i32;

        let mut state = self.state.lock().unwrap();
        if percent == state.last_percent {
            return;
        }
        state.last_percent = percent;

        let line = serde_json::json!({ "progress": fraction });
        let _ = writeln!(state.writer, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_geometry_at_half() {
        let line = render_bar(0.5, 50);
        assert!(line.starts_with('\r'));
        // 20 filled cells, cursor, 19 blanks.
        assert_eq!(line, format!("\r[{}>{}]  50% ", "=".repeat(20), " ".repeat(19)));
    }

    #[test]
    fn test_bar_geometry_empty_and_full() {
        let empty = render_bar(0.0, 0);
        assert!(empty.contains(&format!("[>{}]", " ".repeat(39))));
        assert!(empty.ends_with("   0% "));

        // At 1.0 every cell is filled and the cursor is not drawn.
        let full = render_bar(1.0, 100);
        assert!(full.contains(&format!("[{}]", "=".repeat(40))));
        assert!(full.ends_with(" 100% "));
    }

    #[test]
    fn test_percent_right_justified() {
        assert!(render_bar(0.07, 7).ends_with("   7% "));
        assert!(render_bar(0.42, 42).ends_with("  42% "));
    }

    #[test]
    fn test_json_lines_dedupes_percent() {
        let sink = JsonLinesProgress::new(Vec::new());
        sink.advance(0.101);
        sink.advance(0.102); // same integer percent, suppressed
        sink.advance(0.11);

        let state = sink.state.into_inner().unwrap();
        let text = String::from_utf8(state.writer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"progress\""));
    }

    #[test]
    fn test_silent_ignores_everything() {
        let sink = SilentProgress;
        sink.advance(0.3);
        assert!(!sink.should_abort());
    }
}
