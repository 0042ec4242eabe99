// src/config.rs

use crate::smoother::RelaxScheme;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Solver knobs. Finest grid dimensions come from the caller's grids; these
/// are the remaining host parameters.
#[derive(Debug, Clone, Serialize)]
pub struct SolverConfig {
    /// Finest depth d_max (the coarsest depth is 1).
    pub max_depth: usize,
    /// Cap on Newton iterations per relaxation call.
    pub max_relax_iters: usize,
    /// Max-norm residual target of the relaxation.
    pub relaxation_tolerance: f64,
    /// Physical domain length per axis; the spacing at a depth is
    /// h_len_frac / nx. The solve assumes dx = dy = dz.
    pub h_len_frac: f64,
    /// Finite-difference order (2, 4, 6 or 8).
    pub stencil_order: usize,
    pub relax_scheme: RelaxScheme,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_relax_iters: 20,
            relaxation_tolerance: 1e-8,
            h_len_frac: 1.0,
            stencil_order: 2,
            relax_scheme: RelaxScheme::InexactNewton,
        }
    }
}

impl SolverConfig {
    /// Configure via `FAS_MG_*` env vars so runs can be tweaked without
    /// recompiling the driver.
    pub fn from_env() -> Self {
        fn get_usize(name: &str) -> Option<usize> {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
        }
        fn get_f64(name: &str) -> Option<f64> {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
        }

        let mut cfg = Self::default();
        if let Some(v) = get_usize("FAS_MG_MAX_DEPTH") {
            cfg.max_depth = v.max(1);
        }
        if let Some(v) = get_usize("FAS_MG_MAX_RELAX_ITERS") {
            cfg.max_relax_iters = v.max(1);
        }
        if let Some(v) = get_f64("FAS_MG_TOLERANCE") {
            cfg.relaxation_tolerance = v.max(0.0);
        }
        if let Some(v) = get_f64("FAS_MG_H_LEN_FRAC") {
            if v > 0.0 {
                cfg.h_len_frac = v;
            }
        }
        if let Some(v) = get_usize("FAS_MG_STENCIL_ORDER") {
            cfg.stencil_order = v;
        }
        if let Ok(v) = std::env::var("FAS_MG_RELAX_SCHEME") {
            if let Some(s) = RelaxScheme::from_str(&v) {
                cfg.relax_scheme = s;
            }
        }
        cfg
    }

    /// Write the effective configuration next to the run output.
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
