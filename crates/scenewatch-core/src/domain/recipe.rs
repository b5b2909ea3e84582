//! Render recipes: which bands go to which channel and how they are stretched.

use serde::{Deserialize, Serialize};

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split(';').next().map(str::trim) {
            Some("image/png") => Some(ImageFormat::Png),
            Some("image/jpeg") => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Contrast stretch applied per channel before 8-bit quantisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stretch {
    /// Multiply reflectance by a constant gain (1.0 = provider AUTO scaling).
    Gain { gain: f64 },

    /// Linear map of reflectance `[min, max]` onto `[0, 1]`, clamped.
    Linear { min: f64, max: f64 },
}

/// Band combination plus output parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRecipe {
    /// Short name used in artifact file names, e.g. `false_color`.
    pub name: String,

    /// Red, green, blue source bands.
    pub bands: [String; 3],

    pub stretch: Stretch,

    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl RenderRecipe {
    /// SWIR false colour (B12, B11, B04) at 1024×1024 PNG.
    pub fn false_color() -> Self {
        Self {
            name: "false_color".to_string(),
            bands: ["B12".to_string(), "B11".to_string(), "B04".to_string()],
            stretch: Stretch::Gain { gain: 1.0 },
            width: 1024,
            height: 1024,
            format: ImageFormat::Png,
        }
    }

    /// Evalscript (V3) implementing this recipe.
    pub fn evalscript(&self) -> String {
        let [r, g, b] = &self.bands;
        let pixel = match self.stretch {
            Stretch::Gain { gain } if gain == 1.0 => {
                format!("return [sample.{r}, sample.{g}, sample.{b}];")
            }
            Stretch::Gain { gain } => {
                format!("return [{gain} * sample.{r}, {gain} * sample.{g}, {gain} * sample.{b}];")
            }
            Stretch::Linear { min, max } => format!(
                "const s = (v) => Math.max(0, Math.min(1, (v - {min}) / ({max} - {min})));\n  \
                 return [s(sample.{r}), s(sample.{g}), s(sample.{b})];"
            ),
        };
        format!(
            "//VERSION=3\n\
             function setup() {{\n  \
               return {{\n    \
                 input: [\"{r}\", \"{g}\", \"{b}\"],\n    \
                 output: {{ bands: 3, sampleType: \"AUTO\" }}\n  \
               }};\n\
             }}\n\
             function evaluatePixel(sample) {{\n  \
               {pixel}\n\
             }}\n"
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("render size must be non-zero".to_string());
        }
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid recipe name {:?}", self.name));
        }
        if self.bands.iter().any(|b| b.is_empty()) {
            return Err("band names must be non-empty".to_string());
        }
        if let Stretch::Linear { min, max } = self.stretch
            && min >= max
        {
            return Err(format!("linear stretch needs min < max, got {min}..{max}"));
        }
        Ok(())
    }
}

impl Default for RenderRecipe {
    fn default() -> Self {
        Self::false_color()
    }
}
