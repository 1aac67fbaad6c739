use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::bulk::ProgressSnapshot;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Yellow spinner, bar and counters while a run is in flight.
pub fn run_style() -> ProgressStyle {
    style("\x1b[33m{spinner}\x1b[0m [{bar:30}] {pos}/{len} {wide_msg}")
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷", "⣿"])
        .progress_chars("=> ")
}

/// Green check mark followed by the final message.
pub fn ok_style() -> ProgressStyle {
    style("\x1b[32m✔\x1b[0m {wide_msg}")
}

/// Red cross followed by the final message.
pub fn err_style() -> ProgressStyle {
    style("\x1b[31m✘\x1b[0m {wide_msg}")
}

pub fn new_bar(total: usize, operation: &str) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(run_style());
    pb.set_message(format!("{} starting", operation));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Mirror one snapshot onto the bar.
pub fn update_bar(pb: &ProgressBar, s: &ProgressSnapshot) {
    pb.set_length(s.total as u64);
    pb.set_position(s.settled() as u64);
    pb.set_message(format!(
        "{}: {} running, {} failed, {} pending",
        s.operation_name, s.running, s.failed, s.pending
    ));
}

pub fn finish_bar(pb: &ProgressBar, failed: usize, summary: String) {
    pb.set_style(if failed == 0 { ok_style() } else { err_style() });
    pb.finish_with_message(summary);
}
