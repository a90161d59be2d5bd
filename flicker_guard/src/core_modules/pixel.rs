// THEORY (single-pixel color math):
// The `Pixel` module is the smallest unit of the detector. It is a "dumb" container for
// one RGB sample plus the handful of single-pixel transforms the change metrics need.
// Nothing here looks at neighbours or at previous frames; comparisons between frames
// live in `metric_engine`.
//
// Two transforms are provided:
// - luminance: Rec. 601 luma on the raw 0..255 channels, the same weighting a grayscale
//   conversion uses. The luminance metric averages this over a frame.
// - CIE L*a*b*: sRGB (D65) → linear light → XYZ → Lab. Only a* and b* feed the color
//   metric, but L* is kept so the conversion stays a complete, testable unit.
//
// The sRGB → linear step goes through a 256-entry `OnceLock` LUT; per pixel the hot path
// is a table lookup, a 3x3 matrix and three cube roots.

pub mod pixel {
    use std::sync::OnceLock;

    pub type Channel = u8;
    pub type Luminance = f64;

    static SRGB_TO_LINEAR_LUT: OnceLock<[f64; 256]> = OnceLock::new();

    // sRGB → XYZ (D65), rows are X, Y, Z.
    const RGB_TO_XYZ: [[f64; 3]; 3] = [
        [0.412453, 0.357580, 0.180423],
        [0.212671, 0.715160, 0.072169],
        [0.019334, 0.119193, 0.950227],
    ];
    const D65_WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];
    const LAB_EPSILON: f64 = 0.008856;

    /// A color in CIE L*a*b* space.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Lab {
        /// Lightness, 0..100.
        pub l: f64,
        /// Green (negative) to red (positive) axis.
        pub a: f64,
        /// Blue (negative) to yellow (positive) axis.
        pub b: f64,
    }

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl From<&[u8]> for Pixel {
        fn from(bytes: &[u8]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2])
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        #[inline]
        fn srgb_to_linear(value: Channel) -> f64 {
            let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
                let mut table = [0.0f64; 256];
                for (i, slot) in table.iter_mut().enumerate() {
                    let normalized = i as f64 / 255.0;
                    *slot = if normalized <= 0.04045 {
                        normalized / 12.92
                    } else {
                        ((normalized + 0.055) / 1.055).powf(2.4)
                    };
                }
                table
            });
            table[value as usize]
        }

        #[inline]
        fn lab_f(t: f64) -> f64 {
            if t > LAB_EPSILON {
                t.cbrt()
            } else {
                7.787 * t + 16.0 / 116.0
            }
        }

        /// Perceived brightness (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299 * self.red as f64 + 0.587 * self.green as f64 + 0.114 * self.blue as f64
        }

        /// Converts this sRGB pixel to CIE L*a*b* under a D65 white point.
        pub fn to_lab(&self) -> Lab {
            let linear = [
                Self::srgb_to_linear(self.red),
                Self::srgb_to_linear(self.green),
                Self::srgb_to_linear(self.blue),
            ];

            let mut xyz = [0.0f64; 3];
            for (row, out) in RGB_TO_XYZ.iter().zip(xyz.iter_mut()) {
                *out = row[0] * linear[0] + row[1] * linear[1] + row[2] * linear[2];
            }

            let fx = Self::lab_f(xyz[0] / D65_WHITE[0]);
            let fy = Self::lab_f(xyz[1] / D65_WHITE[1]);
            let fz = Self::lab_f(xyz[2] / D65_WHITE[2]);

            Lab {
                l: 116.0 * fy - 16.0,
                a: 500.0 * (fx - fy),
                b: 200.0 * (fy - fz),
            }
        }
    }
}
