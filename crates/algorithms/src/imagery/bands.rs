//! Band naming conventions
//!
//! Catalogs publish the same spectral band under different asset keys. The
//! resolver tries an ordered list of conventions and keeps the first one the
//! scene fully satisfies.

use saag_core::{Error, Result, Scene};

/// Asset keys holding RED and NIR for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPair {
    pub red_key: String,
    pub nir_key: String,
}

impl BandPair {
    pub fn new(red_key: impl Into<String>, nir_key: impl Into<String>) -> Self {
        Self {
            red_key: red_key.into(),
            nir_key: nir_key.into(),
        }
    }

    /// Whether `scene` carries both keys.
    pub fn is_satisfied_by(&self, scene: &Scene) -> bool {
        scene.asset(&self.red_key).is_some() && scene.asset(&self.nir_key).is_some()
    }

    /// Keys of this pair missing from `scene`.
    pub fn missing_in(&self, scene: &Scene) -> Vec<&str> {
        [self.red_key.as_str(), self.nir_key.as_str()]
            .into_iter()
            .filter(|k| scene.asset(k).is_none())
            .collect()
    }
}

/// One `(red, nir)` key template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandConvention {
    pub name: &'static str,
    pub red: &'static str,
    pub nir: &'static str,
}

impl BandConvention {
    fn matches(&self, keys: &[&str]) -> bool {
        keys.contains(&self.red) && keys.contains(&self.nir)
    }

    fn pair(&self) -> BandPair {
        BandPair::new(self.red, self.nir)
    }
}

/// Conventions in priority order.
pub const DEFAULT_CONVENTIONS: &[BandConvention] = &[
    BandConvention {
        name: "sentinel-2 band ids",
        red: "B04",
        nir: "B08",
    },
    BandConvention {
        name: "sentinel-2 band ids with resolution suffix",
        red: "B04_10m",
        nir: "B08_10m",
    },
    BandConvention {
        name: "semantic aliases",
        red: "red",
        nir: "nir",
    },
    BandConvention {
        name: "semantic aliases with wavelength suffix",
        red: "red",
        nir: "nir08",
    },
];

/// Resolves the RED/NIR asset keys of a run.
#[derive(Debug, Clone)]
pub struct BandResolver {
    conventions: Vec<BandConvention>,
}

impl Default for BandResolver {
    fn default() -> Self {
        Self {
            conventions: DEFAULT_CONVENTIONS.to_vec(),
        }
    }
}

impl BandResolver {
    pub fn with_conventions(conventions: Vec<BandConvention>) -> Self {
        Self { conventions }
    }

    pub fn conventions(&self) -> &[BandConvention] {
        &self.conventions
    }

    /// First convention whose keys are both present in `scene`.
    ///
    /// On failure the error lists the scene's asset keys, sorted.
    pub fn resolve(&self, scene: &Scene) -> Result<BandPair> {
        let keys: Vec<&str> = scene.asset_keys().collect();
        match self.conventions.iter().find(|c| c.matches(&keys)) {
            Some(convention) => {
                tracing::debug!(
                    scene = %scene.id,
                    convention = convention.name,
                    red = convention.red,
                    nir = convention.nir,
                    "Resolved band keys"
                );
                Ok(convention.pair())
            }
            None => Err(Error::BandNotFound {
                observed: keys.into_iter().map(str::to_string).collect(),
            }),
        }
    }
}
