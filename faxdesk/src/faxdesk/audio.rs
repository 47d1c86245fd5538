use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::FromSample;
use tokio::sync::mpsc;

/// Gateway audio is 16-bit LE PCM at 8 kHz mono.
const SOURCE_SAMPLE_RATE: usize = 8000;
const CAPTURE_CHANNEL_SIZE: usize = 64;

/// What the session controller needs from the sound hardware: a capture
/// stream acquired before answering, and a single playback sink that holds
/// at most one remote stream at a time.
pub trait AudioBridge {
    /// Opens the microphone. Fails when no input device is available or the
    /// platform refuses capture access.
    fn open_capture(&mut self) -> Result<mpsc::Receiver<Bytes>, anyhow::Error>;

    /// Attaches a remote stream to the playback sink, replacing whatever
    /// stream was attached before.
    fn attach_playback(&mut self, frames: mpsc::Receiver<Bytes>) -> Result<(), anyhow::Error>;

    /// Releases both directions. Safe to call with nothing attached.
    fn detach(&mut self);
}

pub struct AudioSystem {
    host: cpal::Host,
    playback: Option<cpal::Stream>,
    capture: Option<cpal::Stream>,
}

impl AudioSystem {
    pub fn build() -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        Ok(Self {
            host,
            playback: None,
            capture: None,
        })
    }

    fn build_playback_stream(
        &self,
        receiver: mpsc::Receiver<Bytes>,
    ) -> Result<cpal::Stream, anyhow::Error> {
        let mut device = self
            .host
            .default_output_device()
            .ok_or(anyhow::Error::msg("Could not create output device"))?;
        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        let mut config = cpal::StreamConfig::from(config);
        config.channels = 1;
        match sample_format {
            cpal::SampleFormat::I8 => Self::run_output_stream::<i8>(&mut device, &config, receiver),
            cpal::SampleFormat::I16 => Self::run_output_stream::<i16>(&mut device, &config, receiver),
            cpal::SampleFormat::I32 => Self::run_output_stream::<i32>(&mut device, &config, receiver),
            cpal::SampleFormat::I64 => Self::run_output_stream::<i64>(&mut device, &config, receiver),
            cpal::SampleFormat::U8 => Self::run_output_stream::<u8>(&mut device, &config, receiver),
            cpal::SampleFormat::U16 => Self::run_output_stream::<u16>(&mut device, &config, receiver),
            cpal::SampleFormat::U32 => Self::run_output_stream::<u32>(&mut device, &config, receiver),
            cpal::SampleFormat::U64 => Self::run_output_stream::<u64>(&mut device, &config, receiver),
            cpal::SampleFormat::F32 => Self::run_output_stream::<f32>(&mut device, &config, receiver),
            cpal::SampleFormat::F64 => Self::run_output_stream::<f64>(&mut device, &config, receiver),
            sample_format => Err(anyhow::Error::msg(format!(
                "Unsupported sample format '{sample_format}'"
            ))),
        }
    }

    fn run_output_stream<T>(
        device: &mut cpal::Device,
        config: &cpal::StreamConfig,
        mut receiver: mpsc::Receiver<Bytes>,
    ) -> Result<cpal::Stream, anyhow::Error>
    where
        T: cpal::SizedSample + cpal::FromSample<f32> + Default,
    {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as usize;
        let err_fn = |err| log::error!(err:%; "an error occurred on the playback stream");

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                Self::write_stream_data(data, channels, sample_rate, &mut receiver)
            },
            err_fn,
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }

    fn write_stream_data<T>(
        output: &mut [T],
        channels: usize,
        sample_rate: usize,
        receiver: &mut mpsc::Receiver<Bytes>,
    ) where
        T: cpal::Sample + cpal::FromSample<f32> + Default,
    {
        let mut buffer = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            let data = miscs::decode_pcm16(&frame);
            let data = miscs::resample(data, SOURCE_SAMPLE_RATE, sample_rate);

            buffer.extend(data);
            if buffer.len() >= output.len() {
                break;
            }
        }

        output.fill(T::default());
        buffer.reverse();
        for frame in output.chunks_mut(channels) {
            if let Some(s) = buffer.pop() {
                frame.fill(T::from_sample_(s));
            }
        }
    }

    fn build_capture_stream(
        &self,
        sender: mpsc::Sender<Bytes>,
    ) -> Result<cpal::Stream, anyhow::Error> {
        let device = self.host.default_input_device().ok_or(anyhow::Error::msg(
            "Could not open the input device; is capture allowed?",
        ))?;
        let config = device.default_input_config()?;
        let sample_format = config.sample_format();
        let config = cpal::StreamConfig::from(config);
        match sample_format {
            cpal::SampleFormat::I16 => Self::run_input_stream::<i16>(&device, &config, sender),
            cpal::SampleFormat::U16 => Self::run_input_stream::<u16>(&device, &config, sender),
            cpal::SampleFormat::F32 => Self::run_input_stream::<f32>(&device, &config, sender),
            sample_format => Err(anyhow::Error::msg(format!(
                "Unsupported sample format '{sample_format}'"
            ))),
        }
    }

    fn run_input_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sender: mpsc::Sender<Bytes>,
    ) -> Result<cpal::Stream, anyhow::Error>
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as usize;
        let err_fn = |err| log::error!(err:%; "an error occurred on the capture stream");

        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                Self::read_stream_data(data, channels, sample_rate, &sender)
            },
            err_fn,
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }

    fn read_stream_data<T>(
        input: &[T],
        channels: usize,
        sample_rate: usize,
        sender: &mpsc::Sender<Bytes>,
    ) where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        let mono: Vec<f32> = input
            .chunks(channels)
            .filter_map(|frame| frame.first())
            .map(|s| f32::from_sample_(*s))
            .collect();
        let data = miscs::resample(mono, sample_rate, SOURCE_SAMPLE_RATE);
        // The session is best-effort about capture; drop frames on overflow.
        let _ = sender.try_send(miscs::encode_pcm16(&data));
    }
}

impl AudioBridge for AudioSystem {
    fn open_capture(&mut self) -> Result<mpsc::Receiver<Bytes>, anyhow::Error> {
        let (sender, receiver) = mpsc::channel(CAPTURE_CHANNEL_SIZE);
        let stream = self.build_capture_stream(sender)?;
        self.capture = Some(stream);
        Ok(receiver)
    }

    fn attach_playback(&mut self, frames: mpsc::Receiver<Bytes>) -> Result<(), anyhow::Error> {
        let stream = self.build_playback_stream(frames)?;
        // Replacing the slot drops and stops the previous stream.
        self.playback = Some(stream);
        Ok(())
    }

    fn detach(&mut self) {
        self.playback = None;
        self.capture = None;
    }
}

mod miscs {
    use bytes::Bytes;
    use rubato::Resampler;

    pub fn decode_pcm16(bytes: &Bytes) -> Vec<f32> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect()
    }

    pub fn encode_pcm16(data: &[f32]) -> Bytes {
        let mut out = Vec::with_capacity(data.len() * 2);
        for sample in data {
            let sample = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Bytes::from(out)
    }

    pub fn resample(data: Vec<f32>, sample_rate_in: usize, sample_rate_out: usize) -> Vec<f32> {
        if data.is_empty() || sample_rate_in == sample_rate_out {
            return data;
        }
        let sub_chunks = 4;
        let channels_count = 1;
        let mut resampler = rubato::FftFixedIn::<f32>::new(
            sample_rate_in,
            sample_rate_out,
            data.len(),
            sub_chunks,
            channels_count,
        )
        .unwrap();
        resampler.process(&[data], None).unwrap().concat()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn pcm_roundtrip_preserves_amplitude() {
            let frame = encode_pcm16(&[0.0, 0.5, -0.5, 1.0]);
            let decoded = decode_pcm16(&frame);
            assert_eq!(decoded.len(), 4);
            assert!((decoded[1] - 0.5).abs() < 0.001);
            assert!((decoded[2] + 0.5).abs() < 0.001);
        }

        #[test]
        fn resample_changes_the_sample_count() {
            let input: Vec<f32> = (0..800).map(|n| (n as f32 / 80.0).sin()).collect();
            let output = resample(input, 8000, 16000);
            assert!(output.len() > 1200);
        }
    }
}
