use std::fmt;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::transcribe::backend::{FormatTable, HeaderProbe};

/// Container/codec tag and sample rate of one input file, as the active
/// backend names them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDescriptor {
    pub codec_tag: String,
    pub sample_rate_hz: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedFormat {
    Extension(String),
    SampleRate { rate_hz: u32, min_hz: u32, max_hz: u32 },
    Unreadable(String),
}

impl fmt::Display for UnsupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension(ext) if ext.is_empty() => write!(f, "file has no extension"),
            Self::Extension(ext) => write!(f, "extension .{} is not accepted by this backend", ext),
            Self::SampleRate {
                rate_hz,
                min_hz,
                max_hz,
            } => write!(
                f,
                "sample rate {} Hz is outside the accepted range {}-{} Hz",
                rate_hz, min_hz, max_hz
            ),
            Self::Unreadable(msg) => write!(f, "could not read audio header: {}", msg),
        }
    }
}

/// Inspect `path`'s header and validate it against the backend's formats.
///
/// Only container headers are read; nothing is decoded.
pub fn describe(path: &Path, formats: &FormatTable) -> Result<AudioDescriptor, UnsupportedFormat> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let spec = formats
        .lookup(&extension)
        .ok_or_else(|| UnsupportedFormat::Extension(extension.clone()))?;

    let sample_rate_hz = match spec.probe {
        HeaderProbe::Wav => wav_sample_rate(path)?,
        HeaderProbe::Container => container_sample_rate(path, &extension)?,
        HeaderProbe::Raw { assumed_rate_hz } => {
            if !path.is_file() {
                return Err(UnsupportedFormat::Unreadable(format!(
                    "{} is not a readable file",
                    path.display()
                )));
            }
            assumed_rate_hz
        }
    };

    let range = formats.sample_rates;
    if !range.accepts(sample_rate_hz) {
        return Err(UnsupportedFormat::SampleRate {
            rate_hz: sample_rate_hz,
            min_hz: range.min_hz,
            max_hz: range.max_hz,
        });
    }

    Ok(AudioDescriptor {
        codec_tag: spec.codec_tag.to_string(),
        sample_rate_hz,
    })
}

/// [`describe`] on the blocking pool. Header reads are plain file I/O and
/// must stay off the runtime's worker threads.
pub async fn describe_file(path: &Path, formats: FormatTable) -> Result<AudioDescriptor, UnsupportedFormat> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || describe(&path, &formats))
        .await
        .map_err(|e| UnsupportedFormat::Unreadable(format!("header reader task failed: {}", e)))?
}

fn wav_sample_rate(path: &Path) -> Result<u32, UnsupportedFormat> {
    let reader =
        hound::WavReader::open(path).map_err(|e| UnsupportedFormat::Unreadable(e.to_string()))?;
    Ok(reader.spec().sample_rate)
}

fn container_sample_rate(path: &Path, extension: &str) -> Result<u32, UnsupportedFormat> {
    let file = std::fs::File::open(path).map_err(|e| UnsupportedFormat::Unreadable(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| UnsupportedFormat::Unreadable(format!("probe: {}", e)))?;

    // Video containers list their picture track first.
    probed
        .format
        .tracks()
        .iter()
        .find_map(|t| t.codec_params.sample_rate)
        .ok_or_else(|| UnsupportedFormat::Unreadable("no audio track with a sample rate".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::backend::{FormatSpec, SampleRateRange};
    use tempfile::TempDir;

    const FORMATS: &[FormatSpec] = &[
        FormatSpec {
            extension: "wav",
            codec_tag: "wav",
            probe: HeaderProbe::Wav,
        },
        FormatSpec {
            extension: "pcm",
            codec_tag: "audio/l16",
            probe: HeaderProbe::Raw {
                assumed_rate_hz: 16000,
            },
        },
        FormatSpec {
            extension: "flac",
            codec_tag: "flac",
            probe: HeaderProbe::Container,
        },
    ];

    const TABLE: FormatTable = FormatTable {
        formats: FORMATS,
        sample_rates: SampleRateRange::new(8000, 48000),
    };

    fn create_wav_file(path: &Path, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_describe_wav() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("call.wav");
        create_wav_file(&path, 16000);

        let descriptor = describe(&path, &TABLE).unwrap();
        assert_eq!(descriptor.codec_tag, "wav");
        assert_eq!(descriptor.sample_rate_hz, 16000);
    }

    #[test]
    fn test_describe_accepts_rates_at_bounds() {
        let tmp = TempDir::new().unwrap();
        for rate in [8000, 48000] {
            let path = tmp.path().join(format!("edge_{}.wav", rate));
            create_wav_file(&path, rate);
            assert_eq!(describe(&path, &TABLE).unwrap().sample_rate_hz, rate);
        }
    }

    #[test]
    fn test_describe_rejects_rates_just_outside_bounds() {
        let tmp = TempDir::new().unwrap();
        for rate in [7999, 48001] {
            let path = tmp.path().join(format!("edge_{}.wav", rate));
            create_wav_file(&path, rate);
            let err = describe(&path, &TABLE).unwrap_err();
            assert_eq!(
                err,
                UnsupportedFormat::SampleRate {
                    rate_hz: rate,
                    min_hz: 8000,
                    max_hz: 48000
                }
            );
        }
    }

    #[test]
    fn test_describe_rejects_unknown_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let err = describe(&path, &TABLE).unwrap_err();
        assert_eq!(err, UnsupportedFormat::Extension("txt".to_string()));
        assert!(err.to_string().contains(".txt"));
    }

    #[test]
    fn test_describe_extension_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("LOUD.WAV");
        create_wav_file(&path, 22050);
        assert_eq!(describe(&path, &TABLE).unwrap().sample_rate_hz, 22050);
    }

    #[test]
    fn test_describe_raw_pcm_uses_assumed_rate() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raw.pcm");
        std::fs::write(&path, [0u8; 320]).unwrap();

        let descriptor = describe(&path, &TABLE).unwrap();
        assert_eq!(descriptor.codec_tag, "audio/l16");
        assert_eq!(descriptor.sample_rate_hz, 16000);
    }

    #[test]
    fn test_describe_corrupt_wav_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.wav");
        std::fs::write(&path, b"not a riff header").unwrap();

        assert!(matches!(
            describe(&path, &TABLE),
            Err(UnsupportedFormat::Unreadable(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_file_on_blocking_pool() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("call.wav");
        create_wav_file(&path, 44100);
        std::fs::write(tmp.path().join("raw.mp3"), b"id3").unwrap();

        let descriptor = describe_file(&path, TABLE).await.unwrap();
        assert_eq!(descriptor.sample_rate_hz, 44100);
        assert_eq!(
            describe_file(&tmp.path().join("raw.mp3"), TABLE).await,
            Err(UnsupportedFormat::Extension("mp3".to_string()))
        );
    }

    #[test]
    fn test_describe_corrupt_container_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.flac");
        std::fs::write(&path, b"definitely not flac").unwrap();

        assert!(matches!(
            describe(&path, &TABLE),
            Err(UnsupportedFormat::Unreadable(_))
        ));
    }
}
