//! Text-to-speech for card labels and sentences.
//!
//! Piper is used when its binary and a voice model for the locale are installed; espeak-ng (or
//! espeak) is the fallback. Speech never blocks the board and its failures are only logged.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, warn};

use crate::config::SpeechConfig;
use crate::errors::{AppError, AppResult};
use crate::keyword_index::primary_subtag;

const PIPER_TIMEOUT: Duration = Duration::from_secs(10);

/// Audio players tried in order for Piper output.
const PLAYERS: &[&str] = &["aplay", "paplay", "pw-play", "ffplay"];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Speak `text` in `locale` and return once playback has finished.
    async fn speak(&self, text: &str, locale: &str) -> AppResult<()>;

    /// Which engines are available, for display.
    fn describe(&self) -> String;
}

/// Piper voice model file for a language.
fn piper_voice(locale: &str) -> Option<&'static str> {
    match primary_subtag(locale).as_str() {
        "sv" => Some("sv_SE-nst-medium.onnx"),
        "en" => Some("en_US-amy-medium.onnx"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Piper {
    binary: PathBuf,
    voice_dir: PathBuf,
    voice_count: usize,
}

/// Speech through external programs found on `PATH`.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    piper: Option<Piper>,
    player: Option<PathBuf>,
    espeak: Option<PathBuf>,
    rate: u32,
}

impl CommandSpeechEngine {
    /// Look up the installed programs and voice models.
    pub fn detect(config: &SpeechConfig) -> Self {
        let piper = which::which("piper").ok().and_then(|binary| {
            voice_directories(config)
                .into_iter()
                .find_map(|dir| {
                    let count = count_voices(&dir);
                    (count > 0).then_some((dir, count))
                })
                .map(|(voice_dir, voice_count)| Piper {
                    binary,
                    voice_dir,
                    voice_count,
                })
        });
        let player = PLAYERS.iter().find_map(|name| which::which(name).ok());
        let espeak = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .ok();

        let engine = Self {
            piper,
            player,
            espeak,
            rate: config.rate,
        };
        debug!("Speech engines: {}", engine.describe());
        engine
    }

    fn piper_model(&self, locale: &str) -> Option<(&Piper, PathBuf)> {
        let piper = self.piper.as_ref()?;
        let model = piper.voice_dir.join(piper_voice(locale)?);
        model.is_file().then_some((piper, model))
    }

    /// `Ok(false)` when Piper cannot serve `locale`.
    async fn speak_piper(&self, text: &str, locale: &str) -> AppResult<bool> {
        let (Some((piper, model)), Some(player)) = (self.piper_model(locale), &self.player)
        else {
            return Ok(false);
        };

        // Removed on drop, whichever way this returns.
        let wav_path = tempfile::Builder::new()
            .prefix("pecs-board-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path();

        let mut child = Command::new(&piper.binary)
            .arg("--model")
            .arg(&model)
            .arg("--output_file")
            .arg(&wav_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::speech(format!("Failed to start piper: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let status = tokio::time::timeout(PIPER_TIMEOUT, child.wait())
            .await
            .map_err(|_| AppError::speech("piper timed out"))??;
        if !status.success() {
            return Ok(false);
        }

        play(player, &wav_path).await.map(|()| true)
    }

    async fn speak_espeak(&self, text: &str, locale: &str) -> AppResult<()> {
        let espeak = self
            .espeak
            .as_ref()
            .ok_or_else(|| AppError::speech("No text-to-speech engine available"))?;

        let status = Command::new(espeak)
            .arg("-v")
            .arg(primary_subtag(locale))
            .arg("-s")
            .arg(self.rate.to_string())
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| AppError::speech(format!("Failed to start {}: {}", espeak.display(), e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(AppError::speech(format!(
                "{} exited with {}",
                espeak.display(),
                status
            )))
        }
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    async fn speak(&self, text: &str, locale: &str) -> AppResult<()> {
        match self.speak_piper(text, locale).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("Piper failed, falling back to espeak: {}", e),
        }
        self.speak_espeak(text, locale).await
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(piper) = &self.piper {
            parts.push(format!("Piper ({} voices)", piper.voice_count));
        }
        if let Some(espeak) = &self.espeak
            && let Some(name) = espeak.file_name()
        {
            parts.push(name.to_string_lossy().into_owned());
        }

        if parts.is_empty() {
            "No TTS available".to_string()
        } else {
            parts.join(", ")
        }
    }
}

async fn play(player: &Path, wav_path: &Path) -> AppResult<()> {
    let mut command = Command::new(player);
    if player.file_name().is_some_and(|name| name == "ffplay") {
        command.args(["-nodisp", "-autoexit"]);
    }
    let status = command
        .arg(wav_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| AppError::speech(format!("Failed to start {}: {}", player.display(), e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(AppError::speech(format!(
            "{} exited with {}",
            player.display(),
            status
        )))
    }
}

/// Directories searched for Piper voices, configured ones first.
#[must_use]
pub fn voice_directories(config: &SpeechConfig) -> Vec<PathBuf> {
    let mut dirs = config.voice_directories.clone();
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        dirs.push(PathBuf::from(xdg).join("piper-voices"));
    }
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".local/share/piper-voices"));
    }
    dirs.push(PathBuf::from("/usr/share/piper-voices"));
    dirs.push(PathBuf::from("/usr/local/share/piper-voices"));
    dirs
}

fn count_voices(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| {
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "onnx"))
            .count()
    })
}

/// Speaks board labels in the background.
#[derive(Clone)]
pub struct Speaker {
    engine: Arc<dyn SpeechEngine>,
    locale: String,
    enabled: bool,
}

impl Speaker {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: &SpeechConfig) -> Self {
        Self {
            engine,
            locale: config.locale.clone(),
            enabled: config.enabled,
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.engine.describe()
    }

    /// Speak `label` without waiting. Failures are logged.
    pub fn speak(&self, label: &str) {
        self.spawn(label);
    }

    /// Speak `text` and wait for playback. A disabled speaker does nothing.
    pub async fn say(&self, text: &str) -> AppResult<()> {
        if !self.enabled || text.trim().is_empty() {
            return Ok(());
        }
        self.engine.speak(text, &self.locale).await
    }

    fn spawn(&self, label: &str) -> Option<JoinHandle<()>> {
        if !self.enabled {
            debug!("Speech disabled, not speaking '{}'", label);
            return None;
        }

        let speaker = self.clone();
        let label = label.to_string();
        Some(tokio::spawn(
            async move {
                if let Err(e) = speaker.say(&label).await {
                    warn!("Failed to speak '{}': {}", label, e);
                }
            }
            .in_current_span(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use tokio::sync::Notify;
    use tracing_test::traced_test;

    fn config(enabled: bool) -> SpeechConfig {
        SpeechConfig {
            enabled,
            locale: "sv".to_string(),
            ..SpeechConfig::default()
        }
    }

    #[tokio::test]
    async fn test_speak_dispatches_to_engine() {
        let spoken = Arc::new(Notify::new());
        let signal = Arc::clone(&spoken);
        let mut engine = MockSpeechEngine::new();
        engine
            .expect_speak()
            .with(eq("Milk"), eq("sv"))
            .times(1)
            .returning(move |_, _| {
                signal.notify_one();
                Ok(())
            });

        let speaker = Speaker::new(Arc::new(engine), &config(true));
        speaker.speak("Milk");
        tokio::time::timeout(Duration::from_secs(5), spoken.notified())
            .await
            .expect("label was not spoken");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_engine_failure_is_logged() {
        let mut engine = MockSpeechEngine::new();
        engine
            .expect_speak()
            .times(1)
            .returning(|_, _| Err(AppError::speech("no audio device")));

        let speaker = Speaker::new(Arc::new(engine), &config(true));
        speaker.speak("Help");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !logs_contain("Failed to speak 'Help'") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("failure was not logged");
        assert!(logs_contain("no audio device"));
    }

    #[tokio::test]
    async fn test_disabled_speaker_stays_silent() {
        let mut engine = MockSpeechEngine::new();
        engine.expect_speak().never();

        let speaker = Speaker::new(Arc::new(engine), &config(false));
        speaker.speak("Milk");
        assert!(speaker.spawn("Milk").is_none());
        speaker.say("Milk").await.unwrap();
    }

    /// A stand-in `piper` that records its output path and exits with `status`.
    #[cfg(unix)]
    fn fake_piper(dir: &Path, status: u8) -> CommandSpeechEngine {
        use std::os::unix::fs::PermissionsExt;

        let binary = dir.join("piper");
        let script = format!(
            "#!/bin/sh\necho \"$4\" > \"{}\"\ncat > /dev/null\nexit {status}\n",
            dir.join("wav-path").display()
        );
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.join("sv_SE-nst-medium.onnx"), b"model").unwrap();

        CommandSpeechEngine {
            piper: Some(Piper {
                binary,
                voice_dir: dir.to_path_buf(),
                voice_count: 1,
            }),
            player: Some(PathBuf::from("/bin/true")),
            espeak: None,
            rate: 150,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_piper_output_is_removed_on_every_path() {
        for (status, spoken) in [(0, true), (1, false)] {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_piper(dir.path(), status);

            assert_eq!(engine.speak_piper("Hej", "sv").await.unwrap(), spoken);

            let recorded = std::fs::read_to_string(dir.path().join("wav-path")).unwrap();
            let wav = PathBuf::from(recorded.trim());
            assert!(wav.extension().is_some_and(|ext| ext == "wav"));
            assert!(!wav.exists());
        }
    }

    #[test]
    fn test_piper_voices() {
        assert_eq!(piper_voice("sv-SE"), Some("sv_SE-nst-medium.onnx"));
        assert_eq!(piper_voice("en"), Some("en_US-amy-medium.onnx"));
        assert_eq!(piper_voice("fi"), None);
    }

    #[test]
    fn test_voice_directories_start_with_configured() {
        let config = SpeechConfig {
            voice_directories: vec![PathBuf::from("/opt/voices")],
            ..SpeechConfig::default()
        };
        let dirs = voice_directories(&config);
        assert_eq!(dirs[0], PathBuf::from("/opt/voices"));
        assert!(dirs.contains(&PathBuf::from("/usr/share/piper-voices")));
    }

    #[test]
    fn test_count_voices() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sv_SE-nst-medium.onnx"), b"model").unwrap();
        std::fs::write(dir.path().join("sv_SE-nst-medium.onnx.json"), b"{}").unwrap();
        assert_eq!(count_voices(dir.path()), 1);
        assert_eq!(count_voices(&dir.path().join("missing")), 0);
    }
}
