//! Progress bars for bulk operations

use indicatif::{ProgressBar, ProgressStyle};
use nandway_core::flash::Progress;
use nandway_core::Error;

/// Create a progress bar with a phase message
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Progress reporter using indicatif progress bars
#[derive(Default)]
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
    failed_blocks: usize,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_bar(&mut self, total: u64, phase: &str) {
        self.finish("");
        let pb = create_progress_bar_with_phase(total, phase)
            .unwrap_or_else(|_| ProgressBar::new(total));
        self.current_bar = Some(pb);
    }

    fn set_position(&self, pos: u64) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pos);
        }
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Progress for IndicatifProgress {
    fn dumping(&mut self, total_bytes: u64) {
        self.create_bar(total_bytes, "Dumping");
    }

    fn dump_progress(&mut self, bytes_done: u64) {
        self.set_position(bytes_done);
    }

    fn programming(&mut self, first_block: u32, block_count: u32, total_bytes: u64) {
        self.failed_blocks = 0;
        self.create_bar(
            total_bytes,
            &format!("Writing blocks 0x{:X}..0x{:X}", first_block, first_block + block_count),
        );
    }

    fn block_done(&mut self, _block: u32, bytes_done: u64) {
        self.set_position(bytes_done);
    }

    fn block_failed(&mut self, block: u32, error: &Error) {
        self.failed_blocks += 1;
        let line = format!("Block 0x{:X} failed: {}", block, error);
        match &self.current_bar {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }

    fn finished(&mut self) {
        let message = if self.failed_blocks == 0 {
            "complete".to_string()
        } else {
            format!("{} block(s) failed", self.failed_blocks)
        };
        self.finish(&message);
    }
}
