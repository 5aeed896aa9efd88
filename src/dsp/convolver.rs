//! Convolution reverb: uniformly partitioned overlap-save FFT convolution.
//!
//! The impulse response is cut into partitions of one render quantum. Each
//! partition is transformed once; every block of input is transformed once
//! and kept in a frequency-domain delay line, so a block costs one forward
//! FFT, one inverse FFT and one complex multiply-add per partition.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::SirenError;

use super::RENDER_QUANTUM;

pub struct Convolver {
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    /// Spectra of the impulse response partitions.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of past input windows, newest at `head`.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous block followed by the current block.
    window: Vec<f32>,
    time_scratch: Vec<f32>,
    accumulator: Vec<Complex<f32>>,
    /// Set while output is skipped; history is already cleared.
    resting: bool,
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl Convolver {
    /// A convolver with no impulse response. It outputs silence until one
    /// is loaded.
    pub fn new() -> Self {
        let fft_size = 2 * RENDER_QUANTUM;
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);
        let accumulator = r2c.make_output_vec();
        Convolver {
            r2c,
            c2r,
            partitions: Vec::new(),
            history: Vec::new(),
            head: 0,
            window: vec![0.0; fft_size],
            time_scratch: vec![0.0; fft_size],
            accumulator,
            resting: false,
        }
    }

    /// Load a new impulse response. Past input is discarded.
    pub fn set_impulse_response(&mut self, impulse: &[f32]) -> Result<(), SirenError> {
        let fft_size = 2 * RENDER_QUANTUM;
        let mut partitions = Vec::with_capacity(impulse.len().div_ceil(RENDER_QUANTUM));
        for chunk in impulse.chunks(RENDER_QUANTUM) {
            let mut padded = vec![0.0; fft_size];
            padded[..chunk.len()].copy_from_slice(chunk);
            let mut spectrum = self.r2c.make_output_vec();
            self.r2c
                .process(&mut padded, &mut spectrum)
                .map_err(|e| SirenError::InvalidState(format!("impulse FFT failed: {e}")))?;
            partitions.push(spectrum);
        }

        self.history = vec![self.r2c.make_output_vec(); partitions.len()];
        self.partitions = partitions;
        self.head = 0;
        self.window.fill(0.0);
        self.resting = false;
        Ok(())
    }

    /// Skip a quantum whose output nobody hears. Past input is dropped, so
    /// the next [`process`](Self::process) starts from silence.
    pub fn rest(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.resting {
            return;
        }
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.window.fill(0.0);
        self.resting = true;
    }

    /// Convolve one render quantum.
    pub fn process(&mut self, input: &[f32], out: &mut [f32]) -> Result<(), SirenError> {
        debug_assert_eq!(input.len(), RENDER_QUANTUM);
        debug_assert_eq!(out.len(), RENDER_QUANTUM);

        if self.partitions.is_empty() {
            out.fill(0.0);
            return Ok(());
        }
        self.resting = false;

        self.window.copy_within(RENDER_QUANTUM.., 0);
        self.window[RENDER_QUANTUM..].copy_from_slice(input);
        self.time_scratch.copy_from_slice(&self.window);

        let count = self.partitions.len();
        self.head = (self.head + 1) % count;
        self.r2c
            .process(&mut self.time_scratch, &mut self.history[self.head])
            .map_err(|e| SirenError::InvalidState(format!("input FFT failed: {e}")))?;

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (p, partition) in self.partitions.iter().enumerate() {
            let past = &self.history[(self.head + count - p) % count];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(past).zip(partition) {
                *acc += x * h;
            }
        }
        // DC and Nyquist bins of a real signal carry no imaginary part.
        if let Some(first) = self.accumulator.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.accumulator.last_mut() {
            last.im = 0.0;
        }

        self.c2r
            .process(&mut self.accumulator, &mut self.time_scratch)
            .map_err(|e| SirenError::InvalidState(format!("inverse FFT failed: {e}")))?;

        let scale = 1.0 / (2 * RENDER_QUANTUM) as f32;
        for (o, &y) in out.iter_mut().zip(&self.time_scratch[RENDER_QUANTUM..]) {
            *o = y * scale;
        }
        Ok(())
    }
}

impl Default for Convolver {
    fn default() -> Self {
        Self::new()
    }
}
