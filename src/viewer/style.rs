use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::geometry::{DEFAULT_THRESHOLD_DEG, MAX_THRESHOLD_DEG};
use crate::import::ModelType;

pub const THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=MAX_THRESHOLD_DEG;
pub const THICKNESS_RANGE: RangeInclusive<f32> = 0.0..=5.0;
pub const FOV_RANGE: RangeInclusive<f32> = 0.0..=180.0;

/// sRGB line color, parsed from `#rrggbb`, `rrggbb` or `#rgb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LineColor(pub [u8; 3]);

impl LineColor {
    pub const BLACK: LineColor = LineColor([0, 0, 0]);

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Linear RGBA for shader uniforms; the surface is sRGB.
    pub fn to_linear(self) -> [f32; 4] {
        let [r, g, b] = self.0.map(|c| srgb_to_linear(c as f32 / 255.0));
        [r, g, b, 1.0]
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hex color {:?}", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for LineColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(err());
        }
        let channel = |h: &str| u8::from_str_radix(h, 16).map_err(|_| err());
        match hex.len() {
            6 => Ok(LineColor([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            ])),
            3 => {
                let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(LineColor([short(0)?, short(1)?, short(2)?]))
            }
            _ => Err(err()),
        }
    }
}

impl fmt::Display for LineColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A plain copy of the style that widgets can edit freely; changes take
/// effect through [`StyleParams::apply`].
#[derive(Clone, Debug, PartialEq)]
pub struct StyleEdit {
    pub line_color: LineColor,
    pub threshold: f32,
    pub thickness: f32,
    pub fov: f32,
    pub use_shader: bool,
    pub model_type: ModelType,
}

impl Default for StyleEdit {
    fn default() -> Self {
        Self {
            line_color: LineColor::BLACK,
            threshold: DEFAULT_THRESHOLD_DEG,
            thickness: 1.0,
            fov: 40.0,
            use_shader: true,
            model_type: ModelType::Gltf,
        }
    }
}

/// What an [`StyleParams::apply`] call changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StyleChange {
    pub any: bool,
    /// Hard edges must be re-extracted.
    pub threshold: bool,
}

/// The live viewer parameters. Read every frame; every effective mutation
/// bumps `version`.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleParams {
    current: StyleEdit,
    version: u64,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            current: StyleEdit::default(),
            version: 0,
        }
    }
}

impl StyleParams {
    pub fn edit(&self) -> StyleEdit {
        self.current.clone()
    }

    /// Clamps `edit` into range and stores it.
    pub fn apply(&mut self, mut edit: StyleEdit) -> StyleChange {
        edit.threshold = clamp(edit.threshold, &THRESHOLD_RANGE, self.current.threshold);
        edit.thickness = clamp(edit.thickness, &THICKNESS_RANGE, self.current.thickness);
        edit.fov = clamp(edit.fov, &FOV_RANGE, self.current.fov);

        if edit == self.current {
            return StyleChange::default();
        }
        let threshold = edit.threshold != self.current.threshold;
        self.current = edit;
        self.version += 1;
        StyleChange {
            any: true,
            threshold,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn line_color(&self) -> LineColor {
        self.current.line_color
    }

    pub fn threshold(&self) -> f32 {
        self.current.threshold
    }

    pub fn thickness(&self) -> f32 {
        self.current.thickness
    }

    pub fn fov(&self) -> f32 {
        self.current.fov
    }

    pub fn use_shader(&self) -> bool {
        self.current.use_shader
    }

    pub fn model_type(&self) -> ModelType {
        self.current.model_type
    }
}

// NaN keeps the previous value.
fn clamp(value: f32, range: &RangeInclusive<f32>, previous: f32) -> f32 {
    if value.is_nan() {
        previous
    } else {
        value.clamp(*range.start(), *range.end())
    }
}
