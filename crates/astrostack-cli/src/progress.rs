use std::sync::{Mutex, PoisonError};

use astrostack_core::progress::{ProgressReporter, StackingStage};
use indicatif::{ProgressBar, ProgressStyle};

/// Create a bar in the common style, labelled with `label`.
pub fn progress_bar(total: u64, label: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:24} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message(label.to_string());
    Ok(pb)
}

/// Drives one indicatif bar per stacking stage.
#[derive(Default)]
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: StackingStage, total_items: Option<usize>) {
        let label = stage.to_string();
        let bar = match total_items {
            Some(total) => progress_bar(total as u64, &label).unwrap_or_else(|_| ProgressBar::new(total as u64)),
            None => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_message(label);
                spinner
            }
        };
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
    }

    fn advance(&self, items_done: usize) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            bar.inc(items_done as u64);
        }
    }

    fn finish_stage(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).take() {
            bar.finish();
        }
    }
}
