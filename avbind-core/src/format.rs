//! Codec and media type identifiers.

use std::fmt;

/// Kind of media carried by a stream or coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    #[default]
    Unknown,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Data => write!(f, "data"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which way data flows through a stream or coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Read from a container and decoded.
    Inbound,
    /// Encoded and written to a container.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// Codec identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodecId {
    /// Uncompressed video.
    RawVideo,
    /// H.264/AVC.
    H264,
    /// H.265/HEVC.
    H265,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// Signed 16-bit little-endian PCM.
    PcmS16le,
    /// 32-bit float little-endian PCM.
    PcmF32le,
    /// AAC.
    Aac,
    /// Opus.
    Opus,
    /// FLAC.
    Flac,
}

impl CodecId {
    /// Get the media type handled by this codec.
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::RawVideo | Self::H264 | Self::H265 | Self::Vp9 | Self::Av1 => MediaType::Video,
            Self::PcmS16le | Self::PcmF32le | Self::Aac | Self::Opus | Self::Flac => {
                MediaType::Audio
            }
        }
    }

    /// Get the short codec name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RawVideo => "rawvideo",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmF32le => "pcm_f32le",
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::Flac => "flac",
        }
    }

    /// Get the default codec tag (FourCC) as a little-endian integer.
    pub fn default_tag(&self) -> u32 {
        let fourcc: [u8; 4] = match self {
            Self::RawVideo => *b"raw ",
            Self::H264 => *b"avc1",
            Self::H265 => *b"hvc1",
            Self::Vp9 => *b"vp09",
            Self::Av1 => *b"av01",
            Self::PcmS16le => *b"sowt",
            Self::PcmF32le => *b"fl32",
            Self::Aac => *b"mp4a",
            Self::Opus => *b"Opus",
            Self::Flac => *b"fLaC",
        };
        u32::from_le_bytes(fourcc)
    }

    /// Look up a codec by its short name.
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [CodecId; 10] = [
            CodecId::RawVideo,
            CodecId::H264,
            CodecId::H265,
            CodecId::Vp9,
            CodecId::Av1,
            CodecId::PcmS16le,
            CodecId::PcmF32le,
            CodecId::Aac,
            CodecId::Opus,
            CodecId::Flac,
        ];
        ALL.into_iter().find(|id| id.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_media_type() {
        assert_eq!(CodecId::H264.media_type(), MediaType::Video);
        assert_eq!(CodecId::PcmS16le.media_type(), MediaType::Audio);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(CodecId::from_name("HEVC"), Some(CodecId::H265));
        assert_eq!(CodecId::from_name("pcm_s16le"), Some(CodecId::PcmS16le));
        assert_eq!(CodecId::from_name("mpeg2"), None);
    }

    #[test]
    fn test_default_tag() {
        assert_eq!(CodecId::H264.default_tag().to_le_bytes(), *b"avc1");
    }
}
