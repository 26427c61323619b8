//! Reflectance normalization
//!
//! Level-2 products ship surface reflectance either as unit-scale floats or
//! as scaled integers. The default policy is a heuristic: if the largest
//! finite value of either band exceeds a threshold, both bands are divided
//! by a fixed divisor. Collections with a documented scale/offset use the
//! linear policy instead.

use ndarray::{ArrayViewMut3, Zip};
use saag_core::RasterCube;

/// Heuristic threshold above which data is assumed to be integer-scaled.
pub const DEFAULT_THRESHOLD: f32 = 1.5;

/// Divisor applied by the heuristic (Sentinel-2 L2A quantification value).
pub const DEFAULT_DIVISOR: f32 = 10_000.0;

/// How to bring raw band values to unit reflectance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReflectanceScaling {
    /// Divide by `divisor` when the cube max exceeds `threshold`.
    Heuristic { threshold: f32, divisor: f32 },
    /// `value * scale + offset`, always applied.
    Linear { scale: f32, offset: f32 },
}

impl Default for ReflectanceScaling {
    fn default() -> Self {
        ReflectanceScaling::Heuristic {
            threshold: DEFAULT_THRESHOLD,
            divisor: DEFAULT_DIVISOR,
        }
    }
}

impl ReflectanceScaling {
    /// Policy for a catalog collection id.
    pub fn for_collection(collection: &str) -> Self {
        match collection {
            "landsat-c2-l2" => ReflectanceScaling::Linear {
                scale: 0.000_027_5,
                offset: -0.2,
            },
            _ => ReflectanceScaling::default(),
        }
    }
}

/// What the normalizer did to a cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleDecision {
    Unchanged,
    Rescaled { divisor: f32 },
    Linear { scale: f32, offset: f32 },
}

/// Largest finite value across both bands, if any.
pub fn max_finite(cube: &RasterCube) -> Option<f32> {
    cube.red()
        .iter()
        .chain(cube.nir().iter())
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.max(v))))
}

/// Normalize both bands in place. NaN stays NaN.
pub fn normalize(cube: &mut RasterCube, scaling: ReflectanceScaling) -> ScaleDecision {
    let decision = match scaling {
        ReflectanceScaling::Heuristic { threshold, divisor } => match max_finite(cube) {
            Some(max) if max > threshold => ScaleDecision::Rescaled { divisor },
            _ => ScaleDecision::Unchanged,
        },
        ReflectanceScaling::Linear { scale, offset } => ScaleDecision::Linear { scale, offset },
    };

    let (red, nir) = cube.bands_mut();
    match decision {
        ScaleDecision::Unchanged => {}
        ScaleDecision::Rescaled { divisor } => {
            apply(red, nir, |v| v / divisor);
        }
        ScaleDecision::Linear { scale, offset } => {
            apply(red, nir, |v| v * scale + offset);
        }
    }

    tracing::debug!(?decision, "Reflectance normalized");
    decision
}

fn apply(red: ArrayViewMut3<'_, f32>, nir: ArrayViewMut3<'_, f32>, f: impl Fn(f32) -> f32) {
    Zip::from(red).and(nir).for_each(|r, n| {
        *r = f(*r);
        *n = f(*n);
    });
}
