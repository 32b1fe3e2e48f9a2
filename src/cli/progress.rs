//! Progress bar utilities for CLI transfers

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-counting progress bar for a transfer of known total size
pub fn transfer_bar(total_bytes: Option<u64>, message: String) -> ProgressBar {
    let bar = match total_bytes {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
                    )
                    .expect("invalid progress template")
                    .progress_chars("#>-"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {bytes} ({bytes_per_sec}) {msg}")
                    .expect("invalid progress template"),
            );
            bar
        }
    };
    bar.set_message(message);
    bar
}

/// Spinner shown while a device tree is being walked
pub fn walk_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("invalid progress template")
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}
