//! Named coder options.
//!
//! Each media type has a fixed table of options with a type, a default and a
//! valid range. Values are checked when set, so an [`OptionSet`] never holds
//! anything an engine would have to reject.

use avbind_core::{Error, MediaType, Rational, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Int,
    Float,
    Bool,
    Str,
    Rational,
}

/// An option value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Rational(Rational),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Int(_) => OptionKind::Int,
            Self::Float(_) => OptionKind::Float,
            Self::Bool(_) => OptionKind::Bool,
            Self::Str(_) => OptionKind::Str,
            Self::Rational(_) => OptionKind::Rational,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Rational(r) => Some(r.to_f64()),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Rational(v) => write!(f, "{}/{}", v.num(), v.den()),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Rational> for OptionValue {
    fn from(v: Rational) -> Self {
        Self::Rational(v)
    }
}

/// Compile-time default for an option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionDefault {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(&'static str),
    /// Numerator and denominator.
    Rational(i32, i32),
}

/// One row of an option table.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: OptionDefault,
    /// Inclusive numeric range; ignored for booleans and strings.
    pub min: f64,
    pub max: f64,
    pub help: &'static str,
}

impl OptionSpec {
    /// The default as a value.
    pub fn default_value(&self) -> OptionValue {
        match self.default {
            OptionDefault::Int(v) => OptionValue::Int(v),
            OptionDefault::Float(v) => OptionValue::Float(v),
            OptionDefault::Bool(v) => OptionValue::Bool(v),
            OptionDefault::Str(v) => OptionValue::Str(v.to_string()),
            OptionDefault::Rational(n, d) => {
                OptionValue::Rational(Rational::new(n, d).unwrap_or_else(|_| Rational::zero()))
            }
        }
    }

    /// Coerce and range-check a value against this row.
    fn check(&self, value: OptionValue) -> Result<OptionValue> {
        let value = match (self.kind, value) {
            (OptionKind::Float, OptionValue::Int(v)) => OptionValue::Float(v as f64),
            (OptionKind::Rational, OptionValue::Int(v)) => {
                let v = i32::try_from(v).map_err(|_| {
                    Error::invalid_arg(format!("option '{}': {v} out of range", self.name))
                })?;
                OptionValue::Rational(Rational::from_int(v))
            }
            (kind, value) if kind == value.kind() => value,
            (kind, value) => {
                return Err(Error::invalid_arg(format!(
                    "option '{}' expects {kind:?}, got {:?}",
                    self.name,
                    value.kind()
                )))
            }
        };
        if let Some(n) = value.as_number() {
            if n < self.min || n > self.max {
                return Err(Error::invalid_arg(format!(
                    "option '{}': {value} outside {}..={}",
                    self.name, self.min, self.max
                )));
            }
        }
        Ok(value)
    }

    /// Parse a string according to this row's type.
    fn parse(&self, text: &str) -> Result<OptionValue> {
        let bad = || Error::invalid_arg(format!("option '{}': cannot parse '{text}'", self.name));
        let value = match self.kind {
            OptionKind::Int => OptionValue::Int(text.trim().parse().map_err(|_| bad())?),
            OptionKind::Float => OptionValue::Float(text.trim().parse().map_err(|_| bad())?),
            OptionKind::Bool => match text.trim() {
                "1" | "true" | "yes" | "on" => OptionValue::Bool(true),
                "0" | "false" | "no" | "off" => OptionValue::Bool(false),
                _ => return Err(bad()),
            },
            OptionKind::Str => OptionValue::Str(text.to_string()),
            OptionKind::Rational => {
                let (n, d) = text.split_once(['/', ':']).unwrap_or((text, "1"));
                let n: i32 = n.trim().parse().map_err(|_| bad())?;
                let d: i32 = d.trim().parse().map_err(|_| bad())?;
                OptionValue::Rational(Rational::new(n, d)?)
            }
        };
        Ok(value)
    }
}

const fn int(name: &'static str, default: i64, min: i64, max: i64, help: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        kind: OptionKind::Int,
        default: OptionDefault::Int(default),
        min: min as f64,
        max: max as f64,
        help,
    }
}

const fn float(name: &'static str, default: f64, min: f64, max: f64, help: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        kind: OptionKind::Float,
        default: OptionDefault::Float(default),
        min,
        max,
        help,
    }
}

const fn boolean(name: &'static str, default: bool, help: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        kind: OptionKind::Bool,
        default: OptionDefault::Bool(default),
        min: 0.0,
        max: 1.0,
        help,
    }
}

const fn string(name: &'static str, default: &'static str, help: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        kind: OptionKind::Str,
        default: OptionDefault::Str(default),
        min: 0.0,
        max: 0.0,
        help,
    }
}

/// Options understood by video coders.
pub const VIDEO_OPTIONS: &[OptionSpec] = &[
    int("max_b_frames", 0, 0, 16, "maximum number of B-frames between anchors"),
    int("qmin", 2, 0, 69, "minimum quantizer"),
    int("qmax", 31, 0, 1024, "maximum quantizer"),
    int("refs", 1, 1, 16, "reference frames to consider for motion compensation"),
    int("threads", 1, 0, 64, "worker threads, 0 for automatic"),
    float("crf", 23.0, 0.0, 63.0, "constant rate factor"),
    boolean("scene_change_detection", true, "insert key frames on scene cuts"),
    string("preset", "medium", "encoder speed/quality preset"),
    OptionSpec {
        name: "sample_aspect_ratio",
        kind: OptionKind::Rational,
        default: OptionDefault::Rational(0, 1),
        min: 0.0,
        max: 255.0,
        help: "pixel aspect ratio, 0 if unknown",
    },
];

/// Options understood by audio coders.
pub const AUDIO_OPTIONS: &[OptionSpec] = &[
    int("frame_size", 0, 0, 65536, "samples per frame, 0 to let the codec decide"),
    int("cutoff", 0, 0, 96000, "low-pass cutoff in Hz, 0 for automatic"),
    int("compression_level", -1, -1, 12, "codec-specific compression level"),
    int("threads", 1, 0, 64, "worker threads, 0 for automatic"),
    boolean("dither", false, "dither when reducing sample depth"),
    string("language", "und", "ISO 639-2 language of the coded audio"),
];

/// Option table for a media type.
pub fn schema_for(media_type: MediaType) -> &'static [OptionSpec] {
    match media_type {
        MediaType::Video => VIDEO_OPTIONS,
        MediaType::Audio => AUDIO_OPTIONS,
        _ => &[],
    }
}

/// Validated option values for one coder.
#[derive(Debug, Clone)]
pub struct OptionSet {
    schema: &'static [OptionSpec],
    values: BTreeMap<&'static str, OptionValue>,
}

impl OptionSet {
    /// Create an empty set checked against the table for `media_type`.
    pub fn for_media_type(media_type: MediaType) -> Self {
        Self {
            schema: schema_for(media_type),
            values: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &'static [OptionSpec] {
        self.schema
    }

    fn spec(&self, name: &str) -> Result<&'static OptionSpec> {
        self.schema
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| Error::invalid_arg(format!("unknown option '{name}'")))
    }

    /// Set an option, rejecting unknown names, wrong types and out-of-range values.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        let spec = self.spec(name)?;
        let value = spec.check(value.into())?;
        self.values.insert(spec.name, value);
        Ok(())
    }

    /// Parse `text` by the option's type and set it.
    pub fn set_str(&mut self, name: &str, text: &str) -> Result<()> {
        let spec = self.spec(name)?;
        let value = spec.check(spec.parse(text)?)?;
        self.values.insert(spec.name, value);
        Ok(())
    }

    /// Current value, falling back to the default.
    pub fn get(&self, name: &str) -> Result<OptionValue> {
        let spec = self.spec(name)?;
        Ok(self
            .values
            .get(spec.name)
            .cloned()
            .unwrap_or_else(|| spec.default_value()))
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.get(name)? {
            OptionValue::Int(v) => Ok(v),
            other => Err(type_mismatch(name, OptionKind::Int, &other)),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            OptionValue::Float(v) => Ok(v),
            OptionValue::Int(v) => Ok(v as f64),
            other => Err(type_mismatch(name, OptionKind::Float, &other)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            OptionValue::Bool(v) => Ok(v),
            other => Err(type_mismatch(name, OptionKind::Bool, &other)),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<String> {
        match self.get(name)? {
            OptionValue::Str(v) => Ok(v),
            other => Err(type_mismatch(name, OptionKind::Str, &other)),
        }
    }

    pub fn get_rational(&self, name: &str) -> Result<Rational> {
        match self.get(name)? {
            OptionValue::Rational(v) => Ok(v),
            other => Err(type_mismatch(name, OptionKind::Rational, &other)),
        }
    }

    /// Check if an option was explicitly set.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Explicitly set options, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

fn type_mismatch(name: &str, wanted: OptionKind, got: &OptionValue) -> Error {
    Error::invalid_arg(format!(
        "option '{name}' is {:?}, not {wanted:?}",
        got.kind()
    ))
}
