//! Smoke data — small deterministic OHLCV panels.
//!
//! Used by mutation validation to prove a candidate graph compiles *and*
//! executes before it is handed back, and by tests and benches. The series
//! are seeded random walks with a slow regime drift, so trend, breakout and
//! exit factors all see both directions within a few hundred bars.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::container::{Axes, MatrixContainer};
use crate::matrix::{Matrix, Shape};

/// Rows in the default smoke panel. Long enough for the widest default window.
pub const SMOKE_ROWS: usize = 300;
pub const SMOKE_ENTITIES: usize = 3;
pub const SMOKE_SEED: u64 = 42;

/// Synthetic OHLCV matrices for `rows` bars × `entities` entities.
pub struct Ohlcv {
    pub open: Matrix,
    pub high: Matrix,
    pub low: Matrix,
    pub close: Matrix,
    pub volume: Matrix,
}

impl Ohlcv {
    pub fn generate(rows: usize, entities: usize, seed: u64) -> Self {
        let shape = Shape::new(rows, entities);
        let mut open = Matrix::nan(shape);
        let mut high = Matrix::nan(shape);
        let mut low = Matrix::nan(shape);
        let mut close = Matrix::nan(shape);
        let mut volume = Matrix::nan(shape);

        // Rows outer, entities inner: a shorter panel is a prefix of a longer one.
        let mut rng = StdRng::seed_from_u64(seed);
        let mut prev: Vec<f64> = (0..entities).map(|e| 100.0 * (1.0 + 0.25 * e as f64)).collect();
        for r in 0..rows {
            for (e, last) in prev.iter_mut().enumerate() {
                let phase = e as f64 * 0.7;
                let drift = 0.002 * ((r as f64) / 40.0 + phase).sin();
                let ret = drift + rng.gen_range(-0.015..0.015);
                let o = *last * (1.0 + rng.gen_range(-0.003..0.003));
                let c = (*last * (1.0 + ret)).max(1.0);
                let h = o.max(c) * (1.0 + rng.gen_range(0.0..0.01));
                let l = o.min(c) * (1.0 - rng.gen_range(0.0..0.01));
                open.set(r, e, o);
                high.set(r, e, h);
                low.set(r, e, l);
                close.set(r, e, c);
                volume.set(r, e, 1_000_000.0 * rng.gen_range(0.5..1.5));
                *last = c;
            }
        }

        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A container pre-populated with raw `open/high/low/close/volume`.
pub fn container(rows: usize, entities: usize, seed: u64) -> MatrixContainer {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    let mut container = MatrixContainer::new(Axes::daily(start, rows, entities));
    let data = Ohlcv::generate(rows, entities, seed);
    for (name, matrix) in [
        ("open", data.open),
        ("high", data.high),
        ("low", data.low),
        ("close", data.close),
        ("volume", data.volume),
    ] {
        let added = container.add_raw(name, matrix);
        debug_assert!(added.is_ok(), "smoke matrices share the container shape");
    }
    container
}

/// The default smoke panel.
pub fn default_container() -> MatrixContainer {
    container(SMOKE_ROWS, SMOKE_ENTITIES, SMOKE_SEED)
}
