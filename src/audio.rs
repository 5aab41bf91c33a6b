use anyhow::{Context, Result, anyhow, bail};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use rubato::{FftFixedIn, Resampler};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Format of an empty buffer: what the speech service produces.
const DEFAULT_SAMPLE_RATE: u32 = 24_000;
const DEFAULT_CHANNELS: u16 = 1;
const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
        }
    }
}

/// Interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    channels: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn empty() -> Self {
        Self {
            samples: Vec::new(),
            channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            bail!("Invalid audio format: {channels} channels at {sample_rate} Hz");
        }
        if samples.len() % usize::from(channels) != 0 {
            bail!("Sample count {} is not a multiple of {channels} channels", samples.len());
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends `segment`, converting it to this buffer's format. An empty
    /// buffer takes on the format of the first segment.
    pub fn append(&mut self, segment: AudioBuffer) -> Result<()> {
        if self.is_empty() {
            *self = segment;
            return Ok(());
        }

        let samples = remix(&segment.samples, segment.channels, self.channels);
        let samples = resample(&samples, self.channels, segment.sample_rate, self.sample_rate)
            .with_context(|| {
                format!(
                    "Failed to resample segment from {} Hz to {} Hz",
                    segment.sample_rate, self.sample_rate
                )
            })?;
        self.samples.extend(samples);
        Ok(())
    }

    /// Decodes an encoded audio file (MP3, WAV, ...) into PCM.
    pub fn decode_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio segment {}", path.display()))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("Unrecognised audio format")?;
        let mut format = probed.format;

        let (track_id, codec_params) = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .map(|track| (track.id, track.codec_params.clone()))
            .ok_or_else(|| anyhow!("No supported audio tracks found"))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .context("Unsupported codec")?;

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|channels| channels.count());
        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(error))
                    if error.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(error) => return Err(error).context("Failed to read audio packet"),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                    sample_rate = Some(spec.rate);
                    channels = Some(spec.channels.count());
                }
                Err(SymphoniaError::DecodeError(error)) => {
                    tracing::warn!(%error, "Skipping undecodable audio packet");
                }
                Err(error) => return Err(error).context("Failed to decode audio packet"),
            }
        }

        let channels = channels.ok_or_else(|| anyhow!("Audio segment has no channel layout"))?;
        let sample_rate = sample_rate.ok_or_else(|| anyhow!("Audio segment has no sample rate"))?;
        Self::new(
            samples,
            u16::try_from(channels).context("Too many audio channels")?,
            sample_rate,
        )
    }

    /// Encodes the buffer and writes it to `path`, replacing any existing file.
    /// The file is swapped in whole, so readers never see a partial write.
    pub async fn write(self, path: &Path, format: OutputFormat, bitrate_kbps: u32) -> Result<()> {
        let directory = match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&directory)
            .await
            .context("Failed to create output directory")?;

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let bytes = match format {
                OutputFormat::Mp3 => self.encode_mp3(bitrate_kbps)?,
                OutputFormat::Wav => self.encode_wav()?,
            };

            let mut staged = tempfile::Builder::new()
                .prefix(".partial-")
                .tempfile_in(&directory)
                .context("Failed to create temporary output file")?;
            staged
                .write_all(&bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            staged
                .persist(&path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Audio encoder crashed")?
    }

    fn encode_mp3(&self, bitrate_kbps: u32) -> Result<Vec<u8>> {
        // No frames at all: LAME would still flush a padding frame.
        if self.is_empty() {
            return Ok(Vec::new());
        }

        // LAME takes mono or stereo only.
        let buffer = if self.channels > 2 {
            Self {
                samples: remix(&self.samples, self.channels, 1),
                channels: 1,
                sample_rate: self.sample_rate,
            }
        } else {
            self.clone()
        };

        let mut builder = Builder::new().ok_or_else(|| anyhow!("Failed to create MP3 encoder"))?;
        builder
            .set_num_channels(buffer.channels as u8)
            .map_err(|error| anyhow!("Failed to set MP3 channels: {error:?}"))?;
        builder
            .set_sample_rate(buffer.sample_rate)
            .map_err(|error| anyhow!("Failed to set MP3 sample rate: {error:?}"))?;
        builder
            .set_brate(bitrate(bitrate_kbps)?)
            .map_err(|error| anyhow!("Failed to set MP3 bitrate: {error:?}"))?;
        builder
            .set_quality(Quality::Good)
            .map_err(|error| anyhow!("Failed to set MP3 quality: {error:?}"))?;
        let mut encoder = builder
            .build()
            .map_err(|error| anyhow!("Failed to initialise MP3 encoder: {error:?}"))?;

        let mut output = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(
            buffer.frames(),
        ));
        let encoded = if buffer.channels == 1 {
            encoder.encode_to_vec(MonoPcm(buffer.samples.as_slice()), &mut output)
        } else {
            encoder.encode_to_vec(InterleavedPcm(buffer.samples.as_slice()), &mut output)
        };
        encoded.map_err(|error| anyhow!("Failed to encode MP3: {error:?}"))?;
        encoder
            .flush_to_vec::<FlushNoGap>(&mut output)
            .map_err(|error| anyhow!("Failed to flush MP3 encoder: {error:?}"))?;

        Ok(output)
    }

    fn encode_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec)
            .context("Failed to start WAV encoding")?;
        for &sample in &self.samples {
            writer.write_sample(sample).context("Failed to encode WAV sample")?;
        }
        writer.finalize().context("Failed to finish WAV encoding")?;

        Ok(bytes)
    }
}

fn bitrate(kbps: u32) -> Result<Bitrate> {
    Ok(match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => bail!("Unsupported MP3 bitrate {other} kbps"),
    })
}

/// Converts between channel counts by averaging down to mono and copying out.
fn remix(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    if from == to {
        return samples.to_vec();
    }

    let mono = samples.chunks_exact(usize::from(from)).map(|frame| {
        let sum: i32 = frame.iter().map(|&sample| i32::from(sample)).sum();
        (sum / i32::from(from)) as i16
    });

    mono.flat_map(|sample| std::iter::repeat(sample).take(usize::from(to)))
        .collect()
}

/// Resamples interleaved samples with an FFT resampler. The output has
/// `frames * to / from` frames, aligned with the input.
fn resample(samples: &[i16], channels: u16, from: u32, to: u32) -> Result<Vec<i16>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let channels = usize::from(channels);
    let frames = samples.len() / channels;
    let expected = (frames as u64 * u64::from(to) / u64::from(from)) as usize;

    let mut input = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in input.iter_mut().zip(frame) {
            channel.push(f32::from(sample) / f32::from(i16::MAX));
        }
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, channels)?;
    let delay = resampler.output_delay();
    let mut output = vec![Vec::with_capacity(expected + delay + RESAMPLE_CHUNK); channels];

    let mut position = 0;
    while frames - position >= resampler.input_frames_next() {
        let end = position + resampler.input_frames_next();
        let block: Vec<&[f32]> = input.iter().map(|channel| &channel[position..end]).collect();
        extend_channels(&mut output, resampler.process(&block, None)?);
        position = end;
    }

    let rest: Vec<&[f32]> = input.iter().map(|channel| &channel[position..]).collect();
    extend_channels(&mut output, resampler.process_partial(Some(rest.as_slice()), None)?);
    // Drain the resampler's delay line.
    while output[0].len() < expected + delay {
        let tail = resampler.process_partial::<&[f32]>(None, None)?;
        if tail.first().is_none_or(Vec::is_empty) {
            break;
        }
        extend_channels(&mut output, tail);
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for index in delay..(delay + expected).min(output[0].len()) {
        for channel in &output {
            let sample = (channel[index] * f32::from(i16::MAX)).round();
            interleaved.push(sample.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16);
        }
    }
    Ok(interleaved)
}

fn extend_channels(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(processed) {
        channel.extend(samples);
    }
}

#[cfg(test)]
pub(crate) fn wav_bytes(frames: usize, channels: u16, sample_rate: u32, value: i16) -> Vec<u8> {
    let buffer = AudioBuffer::new(
        vec![value; frames * usize::from(channels)],
        channels,
        sample_rate,
    )
    .unwrap();
    buffer.encode_wav().unwrap()
}
