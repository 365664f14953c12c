//! Pixel interpolation kernels for 2D rasters.
//!
//! Arrays are indexed `[line, sample]` with pixel centers at integer
//! coordinates. A coordinate is inside the raster when it falls within the
//! pixel footprint `[-0.5, size - 0.5]` on both axes; neighbours the kernel
//! needs beyond the edge replicate the edge pixel.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Interpolation kernel used when sampling a raster at sub-pixel positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Value of the closest pixel
    Nearest,
    /// Weighted average of the 2x2 neighbourhood
    Bilinear,
    /// Cubic convolution (Keys, a = -0.5) over the 4x4 neighbourhood
    #[default]
    CubicConvolution,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "nearest"),
            Interpolation::Bilinear => write!(f, "bilinear"),
            Interpolation::CubicConvolution => write!(f, "cubic-convolution"),
        }
    }
}

/// Cubic convolution kernel weight.
///
/// W(x) = (a+2)|x|³ - (a+3)|x|² + 1       for |x| <= 1
/// W(x) = a|x|³ - 5a|x|² + 8a|x| - 4a     for 1 < |x| < 2
/// W(x) = 0                               otherwise
///
/// with a = -0.5.
#[inline]
pub fn cubic_convolution_kernel(x: f64) -> f64 {
    const A: f64 = -0.5;

    let abs_x = x.abs();
    if abs_x <= 1.0 {
        ((A + 2.0) * abs_x - (A + 3.0)) * abs_x * abs_x + 1.0
    } else if abs_x < 2.0 {
        ((A * abs_x - 5.0 * A) * abs_x + 8.0 * A) * abs_x - 4.0 * A
    } else {
        0.0
    }
}

/// Pixel value with edge replication
#[inline]
fn pixel(data: &ArrayView2<f64>, sample: isize, line: isize) -> f64 {
    let (lines, samples) = data.dim();
    let s = sample.clamp(0, samples as isize - 1) as usize;
    let l = line.clamp(0, lines as isize - 1) as usize;
    data[[l, s]]
}

/// Sample `data` at sub-pixel position (`sample`, `line`).
///
/// # Returns
/// `None` when the position lies outside the raster footprint or the raster
/// is empty.
pub fn interpolate(
    data: &ArrayView2<f64>,
    sample: f64,
    line: f64,
    method: Interpolation,
) -> Option<f64> {
    let (lines, samples) = data.dim();
    if lines == 0 || samples == 0 {
        return None;
    }
    if !(sample >= -0.5
        && sample <= samples as f64 - 0.5
        && line >= -0.5
        && line <= lines as f64 - 0.5)
    {
        return None;
    }

    let value = match method {
        Interpolation::Nearest => pixel(data, sample.round() as isize, line.round() as isize),
        Interpolation::Bilinear => {
            let s0 = sample.floor();
            let l0 = line.floor();
            let fs = sample - s0;
            let fl = line - l0;
            let (s0, l0) = (s0 as isize, l0 as isize);

            let p00 = pixel(data, s0, l0);
            let p10 = pixel(data, s0 + 1, l0);
            let p01 = pixel(data, s0, l0 + 1);
            let p11 = pixel(data, s0 + 1, l0 + 1);

            let top = p00 + fs * (p10 - p00);
            let bottom = p01 + fs * (p11 - p01);
            top + fl * (bottom - top)
        }
        Interpolation::CubicConvolution => {
            let s0 = sample.floor();
            let l0 = line.floor();
            let fs = sample - s0;
            let fl = line - l0;
            let (s0, l0) = (s0 as isize, l0 as isize);

            let ws = [
                cubic_convolution_kernel(fs + 1.0),
                cubic_convolution_kernel(fs),
                cubic_convolution_kernel(fs - 1.0),
                cubic_convolution_kernel(fs - 2.0),
            ];
            let wl = [
                cubic_convolution_kernel(fl + 1.0),
                cubic_convolution_kernel(fl),
                cubic_convolution_kernel(fl - 1.0),
                cubic_convolution_kernel(fl - 2.0),
            ];

            let mut sum = 0.0;
            for (j, &wj) in wl.iter().enumerate() {
                let l = l0 - 1 + j as isize;
                for (i, &wi) in ws.iter().enumerate() {
                    sum += pixel(data, s0 - 1 + i as isize, l) * wi * wj;
                }
            }
            sum
        }
    };

    Some(value)
}
