//! Multi-band rasters and their on-disk store.
//!
//! Pixels are held as `f64` in `[line, sample]` arrays, one per band. The
//! file store reads and writes 16-bit grayscale images through the `image`
//! crate; file format is chosen from the extension (PNG or TIFF).

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use log::debug;
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("raster has no bands")]
    NoBands,

    #[error("band {band} is {found:?} (lines, samples), expected {expected:?}")]
    BandShape {
        band: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("no raster found at {0}")]
    NotFound(PathBuf),
}

/// Image data with one or more equally sized bands
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    bands: Vec<Array2<f64>>,
}

impl Raster {
    pub fn new(bands: Vec<Array2<f64>>) -> Result<Self, RasterError> {
        let expected = bands.first().ok_or(RasterError::NoBands)?.dim();
        if let Some((band, found)) = bands
            .iter()
            .map(|b| b.dim())
            .enumerate()
            .find(|(_, dim)| *dim != expected)
        {
            return Err(RasterError::BandShape {
                band: band + 1,
                expected,
                found,
            });
        }
        Ok(Self { bands })
    }

    pub fn from_band(band: Array2<f64>) -> Self {
        Self { bands: vec![band] }
    }

    /// Caller guarantees at least one band and equal band shapes
    pub(crate) fn from_bands_unchecked(bands: Vec<Array2<f64>>) -> Self {
        debug_assert!(!bands.is_empty());
        Self { bands }
    }

    pub fn samples(&self) -> usize {
        self.bands[0].ncols()
    }

    pub fn lines(&self) -> usize {
        self.bands[0].nrows()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band by 0-based index
    pub fn band(&self, index: usize) -> &Array2<f64> {
        &self.bands[index]
    }

    pub fn bands(&self) -> &[Array2<f64>] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Array2<f64>> {
        self.bands
    }
}

/// Named raster storage
pub trait RasterStore {
    fn open(&self, path: &Path) -> Result<Raster, RasterError>;

    fn create(&self, path: &Path, raster: &Raster) -> Result<(), RasterError>;
}

/// 16-bit grayscale image files.
///
/// A single-band raster maps to the file itself. Multi-band rasters use one
/// file per band named `<stem>_b<n>.<ext>`, `n` counting from 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileStore;

impl ImageFileStore {
    /// Path of 1-based `band` in a multi-band raster stored at `path`
    pub fn band_path(path: &Path, band: usize) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{stem}_b{band}.{}", ext.to_string_lossy()),
            None => format!("{stem}_b{band}"),
        };
        path.with_file_name(name)
    }

    fn read_band(path: &Path) -> Result<Array2<f64>, RasterError> {
        let img = image::open(path)?.into_luma16();
        let (width, height) = img.dimensions();
        Ok(Array2::from_shape_fn(
            (height as usize, width as usize),
            |(line, sample)| img.get_pixel(sample as u32, line as u32)[0] as f64,
        ))
    }

    fn write_band(path: &Path, band: &Array2<f64>) -> Result<(), RasterError> {
        let (lines, samples) = band.dim();
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(samples as u32, lines as u32, |x, y| {
                Luma([to_u16(band[[y as usize, x as usize]])])
            });
        img.save(path)?;
        Ok(())
    }
}

impl RasterStore for ImageFileStore {
    fn open(&self, path: &Path) -> Result<Raster, RasterError> {
        if path.exists() {
            debug!("Reading single-band raster {}", path.display());
            return Ok(Raster::from_band(Self::read_band(path)?));
        }

        let mut bands = Vec::new();
        loop {
            let band_path = Self::band_path(path, bands.len() + 1);
            if !band_path.exists() {
                break;
            }
            bands.push(Self::read_band(&band_path)?);
        }
        if bands.is_empty() {
            return Err(RasterError::NotFound(path.to_path_buf()));
        }
        debug!("Read {} bands for {}", bands.len(), path.display());
        Raster::new(bands)
    }

    fn create(&self, path: &Path, raster: &Raster) -> Result<(), RasterError> {
        if raster.band_count() == 1 {
            return Self::write_band(path, raster.band(0));
        }
        for (i, band) in raster.bands().iter().enumerate() {
            Self::write_band(&Self::band_path(path, i + 1), band)?;
        }
        Ok(())
    }
}

/// Round and clamp into the 16-bit range; NaN becomes 0
fn to_u16(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, u16::MAX as f64) as u16
}
