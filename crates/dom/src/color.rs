//! CSS colour values reduced to 8-bit RGBA channels.
//! Spec: <https://www.w3.org/TR/css-color-4/>

use core::fmt;
use csscolorparser::Color;

/// An sRGB colour with 8-bit channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Rgba {
    /// Fully transparent black, the initial value of `background-color`.
    pub const TRANSPARENT: Self = Self {
        red: 0,
        green: 0,
        blue: 0,
        alpha: 0,
    };

    /// Opaque black, the initial value of `color`.
    pub const BLACK: Self = Self {
        red: 0,
        green: 0,
        blue: 0,
        alpha: 255,
    };

    /// Whether the alpha channel is zero.
    #[inline]
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.alpha == 0
    }
}

impl fmt::Display for Rgba {
    /// Serialise the way computed colours are reported: `rgb()` when opaque,
    /// `rgba()` with a decimal alpha otherwise.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha == u8::MAX {
            return write!(
                formatter,
                "rgb({}, {}, {})",
                self.red, self.green, self.blue
            );
        }
        let alpha = (f32::from(self.alpha) / 255.0 * 1000.0).round() / 1000.0;
        write!(
            formatter,
            "rgba({}, {}, {}, {alpha})",
            self.red, self.green, self.blue
        )
    }
}

/// Parse a CSS `<color>` into 8-bit RGBA channels.
///
/// Supports named colors, hex forms (`#rgb`/`#rgba`/`#rrggbb`/`#rrggbbaa`),
/// and functional notations like `rgb()/rgba()`.
///
/// Spec: <https://www.w3.org/TR/css-color-4/#typedef-color>
#[inline]
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let parsed: Color = input.trim().parse().ok()?;
    let [red, green, blue, alpha] = parsed.to_rgba8();
    Some(Rgba {
        red,
        green,
        blue,
        alpha,
    })
}
