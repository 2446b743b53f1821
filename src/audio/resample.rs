//! Software format conversion for devices that refuse the preferred format.

/// Average interleaved frames down to one channel.
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            match samples.get(source_idx + 1) {
                Some(&right) => {
                    let left = samples[source_idx];
                    left + (right - left) * fraction
                }
                None => samples[source_idx],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0.0, 0.5, 1.0], 8000, 16000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0.0);
        assert!(resampled[1] > 0.0 && resampled[1] < 0.5);
        assert_eq!(resampled[2], 0.5);
    }

    #[test]
    fn resample_48k_to_16k_thirds_the_length() {
        let resampled = resample(&vec![0.0; 4800], 48000, 16000);
        assert_eq!(resampled.len(), 1600);
    }

    #[test]
    fn resample_handles_edge_cases() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[0.25], 16000, 8000), vec![0.25]);
    }

    #[test]
    fn resample_preserves_constant_signal() {
        let resampled = resample(&vec![0.5; 100], 24000, 44100);
        assert!(resampled.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn stereo_downmix_averages_channels() {
        assert_eq!(mix_to_mono(&[-0.5, 0.5, 0.25, 0.75], 2), vec![0.0, 0.5]);
    }

    #[test]
    fn downmix_drops_incomplete_frame() {
        assert_eq!(mix_to_mono(&[0.2, 0.4, 0.9], 2).len(), 1);
    }
}
