use crate::error::StillcastError;

/// Named output resolutions. Every entry has even dimensions so the encoded
/// yuv420p stream never needs padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resolution {
    Sd,
    Hd,
    FullHd,
    Qhd,
    Uhd,
    Vertical,
    Square,
}

impl Resolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Sd => (854, 480),
            Resolution::Hd => (1280, 720),
            Resolution::FullHd => (1920, 1080),
            Resolution::Qhd => (2560, 1440),
            Resolution::Uhd => (3840, 2160),
            Resolution::Vertical => (1080, 1920),
            Resolution::Square => (1080, 1080),
        }
    }

    pub fn width(self) -> u32 {
        self.dimensions().0
    }

    pub fn height(self) -> u32 {
        self.dimensions().1
    }

    pub fn name(self) -> &'static str {
        match self {
            Resolution::Sd => "SD",
            Resolution::Hd => "HD",
            Resolution::FullHd => "FullHD",
            Resolution::Qhd => "QHD",
            Resolution::Uhd => "UHD",
            Resolution::Vertical => "Vertical",
            Resolution::Square => "Square",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Resolution {
    type Err = StillcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sd" | "480p" => Ok(Resolution::Sd),
            "hd" | "720p" => Ok(Resolution::Hd),
            "fullhd" | "full_hd" | "full-hd" | "1080p" => Ok(Resolution::FullHd),
            "qhd" | "1440p" | "2k" => Ok(Resolution::Qhd),
            "uhd" | "4k" | "2160p" => Ok(Resolution::Uhd),
            "vertical" | "portrait" | "shorts" => Ok(Resolution::Vertical),
            "square" => Ok(Resolution::Square),
            other => Err(StillcastError::validation(format!(
                "unknown resolution '{other}' (expected SD, HD, FullHD, QHD, UHD, Vertical or Square)"
            ))),
        }
    }
}
