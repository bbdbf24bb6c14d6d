//! Stand-in devices for running the kiosk without a camera or microphone.

use std::sync::Mutex;

use anyhow::{bail, Result};
use rand::Rng;
use tokio::time::Instant;

use super::{AudioSource, FrameSource, RawFrame};

const SAMPLE_RATE: u32 = 16_000;

/// A noisy gradient, good enough for an encoder round trip.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&self) -> Result<RawFrame> {
        let mut rng = rand::thread_rng();
        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let base = ((x + y) * 255 / (self.width + self.height).max(1)) as u8;
                let noise: u8 = rng.gen_range(0..16);
                rgb.extend_from_slice(&[base.saturating_add(noise), base, 255 - base]);
            }
        }
        Ok(RawFrame {
            width: self.width,
            height: self.height,
            rgb,
        })
    }
}

/// Records silence for as long as the take lasts.
#[derive(Default)]
pub struct SyntheticMicrophone {
    started: Mutex<Option<Instant>>,
}

impl SyntheticMicrophone {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for SyntheticMicrophone {
    fn begin(&self) -> Result<()> {
        let mut started = self.started.lock().unwrap_or_else(|p| p.into_inner());
        *started = Some(Instant::now());
        Ok(())
    }

    fn finish(&self) -> Result<Vec<u8>> {
        let mut started = self.started.lock().unwrap_or_else(|p| p.into_inner());
        let Some(began) = started.take() else {
            bail!("microphone was not started");
        };
        let samples = (began.elapsed().as_secs_f64() * SAMPLE_RATE as f64) as u32;
        Ok(silent_wav(samples))
    }
}

/// 16-bit mono PCM WAV holding `samples` zero samples.
fn silent_wav(samples: u32) -> Vec<u8> {
    let data_len = samples * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}
