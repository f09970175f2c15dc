//! `vigor` command-line host.
//!
//! ```text
//! vigor analyze <file.wav> [--device ID] [--words N] [--method M] [--output FILE]
//! vigor calibrate --device ID --label L --silence FILE --speech FILE
//! vigor profiles [delete ID]
//! vigor recalibration [--device ID]
//! vigor config [show | weight METRIC N | enable METRIC | disable METRIC | method M]
//! ```
//!
//! Profiles and metric config live in SQLite; app settings live in a JSON
//! file next to it.

mod settings;
mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use vigor_core::calibration::CalibrationWizard;
use vigor_core::storage::METRIC_CONFIG_KEY;
use vigor_core::vad::{segment_buffer, EnergyVad, DEFAULT_FRAME_MS};
use vigor_core::{
    AnalysisRequest, AnalysisResult, AudioBuffer, DeepgramConfig, DeepgramTranscriber,
    EnergyAnalyzer, KeyValueStore, MetricConfigSet, MetricId, SpeechRateMethod,
};

use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use storage::SqliteStore;

const USAGE: &str = "\
Usage:
  vigor analyze <file.wav> [--device ID] [--words N] [--method M] [--output FILE]
  vigor calibrate --device ID --label LABEL --silence FILE --speech FILE
  vigor profiles [delete ID]
  vigor recalibration [--device ID]
  vigor config [show | weight METRIC N | enable METRIC | disable METRIC | method M]

Methods: deepgram-stt, web-speech-api, spectral-flux, energy-peaks
Metrics: volume, speechRate, acceleration, responseTime, pauses";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Analyze {
        wav: PathBuf,
        device: Option<String>,
        words: Option<u32>,
        method: Option<SpeechRateMethod>,
        output: Option<PathBuf>,
    },
    Calibrate {
        device: String,
        label: String,
        silence: PathBuf,
        speech: PathBuf,
    },
    Profiles {
        delete: Option<String>,
    },
    Recalibration {
        device: Option<String>,
    },
    Config(ConfigCommand),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
enum ConfigCommand {
    Show,
    Weight(MetricId, u32),
    Enable(MetricId),
    Disable(MetricId),
    Method(SpeechRateMethod),
}

fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut it = args.into_iter();
    let Some(command) = it.next() else {
        return Ok(Command::Help);
    };
    let rest: Vec<String> = it.collect();

    match command.as_str() {
        "analyze" => {
            let mut wav: Option<PathBuf> = None;
            let mut device = None;
            let mut words = None;
            let mut method = None;
            let mut output = None;
            let mut it = rest.into_iter();
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--device" => device = Some(value(&mut it, "--device")?),
                    "--words" => {
                        let v = value(&mut it, "--words")?;
                        words = Some(v.parse::<u32>().with_context(|| format!("invalid --words: {v}"))?);
                    }
                    "--method" => method = Some(value(&mut it, "--method")?.parse::<SpeechRateMethod>()?),
                    "--output" => output = Some(PathBuf::from(value(&mut it, "--output")?)),
                    other if other.starts_with("--") => bail!("unknown argument: {other}"),
                    other => {
                        if wav.replace(PathBuf::from(other)).is_some() {
                            bail!("only one input file is supported");
                        }
                    }
                }
            }
            let wav = wav.ok_or_else(|| anyhow!("analyze needs a WAV file"))?;
            Ok(Command::Analyze {
                wav,
                device,
                words,
                method,
                output,
            })
        }
        "calibrate" => {
            let (mut device, mut label, mut silence, mut speech) = (None, None, None, None);
            let mut it = rest.into_iter();
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--device" => device = Some(value(&mut it, "--device")?),
                    "--label" => label = Some(value(&mut it, "--label")?),
                    "--silence" => silence = Some(PathBuf::from(value(&mut it, "--silence")?)),
                    "--speech" => speech = Some(PathBuf::from(value(&mut it, "--speech")?)),
                    other => bail!("unknown argument: {other}"),
                }
            }
            let device = device.ok_or_else(|| anyhow!("calibrate needs --device"))?;
            Ok(Command::Calibrate {
                label: label.unwrap_or_else(|| device.clone()),
                device,
                silence: silence.ok_or_else(|| anyhow!("calibrate needs --silence"))?,
                speech: speech.ok_or_else(|| anyhow!("calibrate needs --speech"))?,
            })
        }
        "profiles" => match rest.as_slice() {
            [] => Ok(Command::Profiles { delete: None }),
            [verb, id] if verb == "delete" => Ok(Command::Profiles {
                delete: Some(id.clone()),
            }),
            _ => bail!("usage: vigor profiles [delete ID]"),
        },
        "recalibration" => match rest.as_slice() {
            [] => Ok(Command::Recalibration { device: None }),
            [flag, id] if flag == "--device" => Ok(Command::Recalibration {
                device: Some(id.clone()),
            }),
            _ => bail!("usage: vigor recalibration [--device ID]"),
        },
        "config" => {
            let sub = match rest.as_slice() {
                [] => ConfigCommand::Show,
                [verb] if verb == "show" => ConfigCommand::Show,
                [verb, metric, n] if verb == "weight" => ConfigCommand::Weight(
                    metric.parse()?,
                    n.parse().with_context(|| format!("invalid weight: {n}"))?,
                ),
                [verb, metric] if verb == "enable" => ConfigCommand::Enable(metric.parse()?),
                [verb, metric] if verb == "disable" => ConfigCommand::Disable(metric.parse()?),
                [verb, method] if verb == "method" => ConfigCommand::Method(method.parse()?),
                _ => bail!("usage: vigor config [show | weight METRIC N | enable METRIC | disable METRIC | method M]"),
            };
            Ok(Command::Config(sub))
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("unknown command: {other}"),
    }
}

fn value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    it.next().ok_or_else(|| anyhow!("missing value for {flag}"))
}

fn read_wav_mono_f32(path: &Path) -> Result<AudioBuffer> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            // Full scale of the file's own depth: 127 for 8-bit, 32767 for 16-bit.
            let max = ((1_i64 << (spec.bits_per_sample.clamp(2, 32) - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

fn build_analyzer(settings: &AppSettings, kv: Arc<dyn KeyValueStore>) -> Result<EnergyAnalyzer> {
    // First run: seed the stored metric config with the settings' method.
    let seeded = kv.get(METRIC_CONFIG_KEY)?.is_some();
    let analyzer = EnergyAnalyzer::new(settings.analyzer_config(), kv);
    if !seeded {
        analyzer.update_metric_config(|m| m.set_speech_rate_method(settings.speech_rate_method))?;
    }

    let Some(key) = settings.deepgram_api_key.clone() else {
        return Ok(analyzer);
    };
    let mut config = DeepgramConfig::new(key);
    config.model = settings.deepgram_model.clone();
    match DeepgramTranscriber::new(config) {
        Ok(t) => Ok(analyzer.with_transcriber(Arc::new(t))),
        Err(e) => {
            warn!(error = %e, "Deepgram unavailable, transcript methods will fall back");
            Ok(analyzer)
        }
    }
}

fn print_result(result: &AnalysisResult) {
    println!("overall        {:>5.0}  ({:?})", result.overall_score, result.emotional_feedback);
    println!(
        "volume         {:>5.0}  {:.1} dB (raw {:.1} LUFS, offset {:+.1} dB)",
        result.volume.score,
        result.volume.average_db,
        result.volume.raw_lufs,
        result.volume.device_db_offset
    );
    println!(
        "speech rate    {:>5.0}  {:.0} wpm via {:?}",
        result.speech_rate.score, result.speech_rate.words_per_minute, result.speech_rate.method
    );
    println!(
        "acceleration   {:>5.0}  factor {:.1}{}",
        result.acceleration.score,
        result.acceleration.acceleration_factor,
        if result.acceleration.is_accelerating {
            ", accelerating"
        } else {
            ""
        }
    );
    println!(
        "response time  {:>5.0}  {:.0} ms",
        result.response_time.score, result.response_time.response_time_ms
    );
    println!(
        "pauses         {:>5.0}  ratio {:.2} ({:?})",
        result.pauses.score, result.pauses.pause_ratio, result.pauses.source
    );
}

fn print_config(config: &MetricConfigSet) {
    println!("speech rate method: {}", config.speech_rate_method());
    for m in config.metrics() {
        println!(
            "{:<13} {:>3}  {:<8} min {:>7.2}  ideal {:>7.2}  max {:>7.2}",
            m.id.as_str(),
            m.weight,
            if m.enabled { "enabled" } else { "disabled" },
            m.thresholds.min,
            m.thresholds.ideal,
            m.thresholds.max
        );
    }
}

async fn run(command: Command) -> Result<()> {
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let settings_path = default_settings_path();
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
    }
    settings.apply_env_overrides();

    let store = SqliteStore::new(SqliteStore::default_db_path())?;
    info!(settings_path = %settings_path.display(), db_path = %store.path().display(), "settings loaded");
    let kv: Arc<dyn KeyValueStore> = Arc::new(store);
    let analyzer = build_analyzer(&settings, kv)?;

    match command {
        Command::Help => {}
        Command::Analyze {
            wav,
            device,
            words,
            method,
            output,
        } => {
            let buffer = read_wav_mono_f32(&wav)?;
            let mut vad = EnergyVad::new(settings.vad_threshold, settings.vad_hangover_frames);
            let vad_metrics = segment_buffer(&mut vad, &buffer, DEFAULT_FRAME_MS);
            info!(
                file = %wav.display(),
                secs = buffer.duration_secs(),
                speech_ratio = vad_metrics.speech_ratio,
                "recording loaded"
            );

            if let Some(method) = method {
                let mut config = analyzer.metric_config();
                config.set_speech_rate_method(method);
                analyzer.override_metric_config(config);
            }

            let mut request = AnalysisRequest::from_buffer(buffer).with_vad(vad_metrics);
            if let Some(id) = device.or_else(|| settings.device_id.clone()) {
                request = request.with_device(id);
            }
            if let Some(n) = words {
                request = request.with_word_count(n);
            }
            if analyzer.metric_config().speech_rate_method() == SpeechRateMethod::DeepgramStt {
                let blob = std::fs::read(&wav)?;
                request = request.with_audio_blob(blob);
            }

            let result = analyzer.analyze(request).await;
            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    print_result(&result);
                }
                None => println!("{json}"),
            }
        }
        Command::Calibrate {
            device,
            label,
            silence,
            speech,
        } => {
            let mut wizard = CalibrationWizard::new(settings.target_lufs);
            let floor = wizard.capture_silence(&read_wav_mono_f32(&silence)?)?;
            let reference = wizard.capture_speech(&read_wav_mono_f32(&speech)?)?;
            let profile = wizard.finish(analyzer.calibration(), &device, &label)?;
            println!(
                "calibrated '{}' ({}): noise floor {:.1} dB, reference {:.1} LUFS, gain {:.3}",
                profile.label, profile.device_id, floor, reference, profile.gain_adjustment
            );
        }
        Command::Profiles { delete: Some(id) } => {
            analyzer.calibration().delete_profile(&id)?;
            println!("deleted profile '{id}'");
        }
        Command::Profiles { delete: None } => {
            let profiles = analyzer.calibration().list_profiles();
            if profiles.is_empty() {
                println!("no calibration profiles");
            }
            for p in profiles {
                println!(
                    "{:<24} {:<20} ref {:>6.1} LUFS  gain {:>6.3}  history {:>2}  last used {}",
                    p.device_id,
                    p.label,
                    p.reference_level,
                    p.gain_adjustment,
                    p.recording_history.len(),
                    p.last_used.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Recalibration { device } => {
            let id = device
                .or_else(|| settings.device_id.clone())
                .ok_or_else(|| anyhow!("no device given and no default deviceId in settings"))?;
            let advice = analyzer.calibration().check_recalibration_needed(&id)?;
            println!("{id}: {:?}", advice.severity);
            for reason in &advice.reasons {
                println!("  - {reason}");
            }
        }
        Command::Config(sub) => {
            match sub {
                ConfigCommand::Show => {}
                ConfigCommand::Weight(id, n) => analyzer.update_metric_config(|m| m.set_weight(id, n))?,
                ConfigCommand::Enable(id) => analyzer.update_metric_config(|m| m.set_enabled(id, true))?,
                ConfigCommand::Disable(id) => {
                    analyzer.update_metric_config(|m| m.set_enabled(id, false))?
                }
                ConfigCommand::Method(method) => {
                    analyzer.update_metric_config(|m| m.set_speech_rate_method(method))?
                }
            }
            print_config(&analyzer.metric_config());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vigor=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("vigor: {e:#}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if let Err(e) = run(command).await {
        eprintln!("vigor: {e:#}");
        std::process::exit(1);
    }
}
