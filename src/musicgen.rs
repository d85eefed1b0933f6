use std::{path::Path, time::Duration};

use anyhow::Context as _;

use crate::{
    encode::ensure_parent_dir,
    error::{StillcastError, StillcastResult},
};

pub const DEFAULT_ENDPOINT: &str = "https://mubert.com/api/v3/track/generate";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// JSON body for the track-generation endpoint. Unused fields are sent as
/// empty strings / zeros, matching what the service expects.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub api_key: String,
    pub genre: String,
    pub mood: String,
    pub intensity: u32,
    pub tempo: u32,
    pub duration: u32,
    pub instrument: String,
    pub audio_format: String,
    pub samplerate: u32,
    pub channels: u32,
    pub bitdepth: u32,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre_id: String,
    pub mood_id: String,
    pub intensity_id: String,
    pub instrument_id: String,
    pub audio_format_id: String,
    pub samplerate_id: String,
    pub channels_id: String,
    pub bitdepth_id: String,
}

impl TrackRequest {
    pub fn new(
        api_key: impl Into<String>,
        genre: impl Into<String>,
        mood: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            genre: genre.into(),
            mood: mood.into(),
            intensity: 0,
            tempo: 0,
            duration: 0,
            instrument: String::new(),
            audio_format: "wav".to_string(),
            samplerate: 0,
            channels: 0,
            bitdepth: 0,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            genre_id: String::new(),
            mood_id: String::new(),
            intensity_id: String::new(),
            instrument_id: String::new(),
            audio_format_id: String::new(),
            samplerate_id: String::new(),
            channels_id: String::new(),
            bitdepth_id: String::new(),
        }
    }

    pub fn validate(&self) -> StillcastResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(StillcastError::validation("api key must be non-empty"));
        }
        if self.genre.trim().is_empty() && self.mood.trim().is_empty() {
            return Err(StillcastError::validation(
                "at least one of genre or mood must be set",
            ));
        }
        Ok(())
    }
}

/// Blocking client for the music-generation API.
pub struct MusicClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl MusicClient {
    pub fn new(endpoint: impl Into<String>) -> StillcastResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StillcastError::api(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// POST the request and return the raw audio bytes from the response.
    pub fn generate(&self, req: &TrackRequest) -> StillcastResult<Vec<u8>> {
        req.validate()?;

        let resp = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .map_err(|e| StillcastError::api(format!("request to '{}' failed: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(StillcastError::api(format!(
                "'{}' returned {status}: {snippet}",
                self.endpoint
            )));
        }

        let bytes = resp
            .bytes()
            .map_err(|e| StillcastError::api(format!("failed to read response body: {e}")))?;
        if bytes.is_empty() {
            return Err(StillcastError::api("response contained no audio bytes"));
        }
        Ok(bytes.to_vec())
    }

    /// Generate a track and write the returned bytes to `out_path`.
    pub fn generate_to_file(&self, req: &TrackRequest, out_path: &Path) -> StillcastResult<()> {
        let bytes = self.generate(req)?;
        ensure_parent_dir(out_path)?;
        std::fs::write(out_path, &bytes)
            .with_context(|| format!("failed to write audio file '{}'", out_path.display()))?;
        tracing::info!(
            out = %out_path.display(),
            bytes = bytes.len(),
            "saved generated track"
        );
        Ok(())
    }
}
