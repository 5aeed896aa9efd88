//! Delay line with per-sample delay time and block-latency reads.

use super::RENDER_QUANTUM;

/// A mono delay line.
///
/// A whole block is read before the block's input is written, so the
/// effective delay is never shorter than one render quantum. This lets the
/// line sit inside a feedback cycle.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
}

impl DelayLine {
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds) as usize + RENDER_QUANTUM + 2;
        DelayLine {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
        }
    }

    /// Read one block of delayed output. `delay_times` holds the delay in
    /// seconds for each output frame.
    pub fn read_block(&self, delay_times: &[f64], out: &mut [f32]) {
        let len = self.buffer.len();
        let min_delay = RENDER_QUANTUM as f64;
        let max_delay = (len - 2) as f64;
        for (i, (slot, &time)) in out.iter_mut().zip(delay_times).enumerate() {
            let delay = (time * self.sample_rate).clamp(min_delay, max_delay);
            let pos = (self.write_pos + i) as f64 - delay;
            let pos = if pos < 0.0 { pos + len as f64 } else { pos };
            let idx = pos.floor() as usize % len;
            let frac = (pos - pos.floor()) as f32;
            let a = self.buffer[idx];
            let b = self.buffer[(idx + 1) % len];
            *slot = a + (b - a) * frac;
        }
    }

    /// Append one block of input.
    pub fn write_block(&mut self, input: &[f32]) {
        let len = self.buffer.len();
        for &sample in input {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Clear the delay buffer.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_block(line: &mut DelayLine, delay: f64, input: &[f32]) -> Vec<f32> {
        let times = vec![delay; input.len()];
        let mut out = vec![0.0; input.len()];
        line.read_block(&times, &mut out);
        line.write_block(input);
        out
    }

    #[test]
    fn impulse_reappears_after_delay() {
        let sample_rate = 1000.0;
        let mut line = DelayLine::new(sample_rate, 1.0);
        let mut impulse = vec![0.0; RENDER_QUANTUM];
        impulse[0] = 1.0;
        let silence = vec![0.0; RENDER_QUANTUM];

        // 0.2 s = 200 samples: lands at index 72 of the second block.
        let first = run_block(&mut line, 0.2, &impulse);
        assert!(first.iter().all(|&s| s == 0.0));
        let second = run_block(&mut line, 0.2, &silence);
        assert!((second[200 - RENDER_QUANTUM] - 1.0).abs() < 1e-6);
        assert_eq!(second.iter().filter(|s| s.abs() > 1e-6).count(), 1);
    }

    #[test]
    fn zero_delay_is_clamped_to_one_quantum() {
        let mut line = DelayLine::new(44100.0, 1.0);
        let mut impulse = vec![0.0; RENDER_QUANTUM];
        impulse[3] = 1.0;
        run_block(&mut line, 0.0, &impulse);
        let out = run_block(&mut line, 0.0, &vec![0.0; RENDER_QUANTUM]);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clear_silences_line() {
        let mut line = DelayLine::new(1000.0, 1.0);
        run_block(&mut line, 0.2, &vec![1.0; RENDER_QUANTUM]);
        line.clear();
        let out = run_block(&mut line, 0.2, &vec![0.0; RENDER_QUANTUM]);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
