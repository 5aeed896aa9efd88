//! Synthetic room impulse responses for the convolution reverb.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::ReverbConfig;

/// Generate a decaying-noise impulse response for a room of `room_size`
/// (0..1). Larger rooms give longer tails. The response is normalized to
/// unit energy so the wet level tracks the dry level.
pub fn room_impulse(room_size: f64, config: &ReverbConfig, sample_rate: f64) -> Vec<f32> {
    let seconds = config.max_seconds * room_size.clamp(0.0, 1.0);
    let len = ((seconds * sample_rate) as usize).max(1);
    let mut rng = SmallRng::seed_from_u64(config.seed);

    let mut impulse: Vec<f32> = (0..len)
        .map(|n| {
            let envelope = (1.0 - n as f64 / len as f64).powf(config.decay);
            (rng.gen_range(-1.0..1.0) * envelope) as f32
        })
        .collect();

    let energy: f32 = impulse.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let scale = energy.sqrt().recip();
        for s in &mut impulse {
            *s *= scale;
        }
    }
    impulse
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReverbConfig {
        ReverbConfig {
            max_seconds: 2.0,
            decay: 2.0,
            seed: 7,
        }
    }

    #[test]
    fn length_tracks_room_size() {
        let small = room_impulse(0.1, &config(), 8000.0);
        let large = room_impulse(0.9, &config(), 8000.0);
        assert_eq!(small.len(), 1600);
        assert_eq!(large.len(), 14400);
    }

    #[test]
    fn unit_energy() {
        let ir = room_impulse(0.5, &config(), 8000.0);
        let energy: f32 = ir.iter().map(|s| s * s).sum();
        assert!((energy - 1.0).abs() < 1e-3, "energy {energy}");
    }

    #[test]
    fn tail_decays() {
        let ir = room_impulse(0.5, &config(), 8000.0);
        let quarter = ir.len() / 4;
        let head: f32 = ir[..quarter].iter().map(|s| s.abs()).sum();
        let tail: f32 = ir[ir.len() - quarter..].iter().map(|s| s.abs()).sum();
        assert!(tail < head * 0.2, "head {head}, tail {tail}");
    }

    #[test]
    fn deterministic_for_a_seed() {
        assert_eq!(room_impulse(0.3, &config(), 8000.0), room_impulse(0.3, &config(), 8000.0));
    }
}
