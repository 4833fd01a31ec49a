pub mod hub_height;
pub mod reader;
pub mod writer;

pub use reader::*;
pub use writer::*;

use ndarray::Array2;
use std::collections::HashMap;

/// Axis vectors of one native input grid. Latitudes may run in either
/// direction and longitudes may be −180..180 or 0..360; nothing here
/// normalizes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

/// Interning table of the grids seen across one assembled year. Input
/// files within a year may use different native grids, so hourly frames
/// reference a grid id instead of carrying axis vectors per hour.
#[derive(Debug, Clone, Default)]
pub struct GridTable {
    grids: Vec<Grid>,
}

impl GridTable {
    pub fn intern(&mut self, grid: Grid) -> usize {
        if let Some(i) = self.grids.iter().position(|g| g == &grid) {
            i
        } else {
            self.grids.push(grid);
            self.grids.len() - 1
        }
    }

    pub fn get(&self, id: usize) -> &Grid {
        &self.grids[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grid> {
        self.grids.iter()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

/// One per-hour field in source units: radiation in W·m⁻², temperature
/// in K, pressure in Pa, wind as raw u/v components. Heights are metres
/// above ground. Wind stays as components until after spatial
/// resolution so direction never interpolates across the 0/360 wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Ghi,
    Albedo,
    TempK(u16),
    PressurePa,
    U(u16),
    V(u16),
}

/// One assembled hour: a grid id plus the derived 2-D frames.
#[derive(Debug, Clone)]
pub struct HourFrame {
    pub grid: usize,
    pub fields: HashMap<Field, Array2<f64>>,
}

impl HourFrame {
    pub fn field(&self, field: Field) -> Option<&Array2<f64>> {
        self.fields.get(&field)
    }
}

/// The assembled year: exactly 8760 slots in local time; a `None` slot is
/// an input gap charged against every requested location.
pub type FrameSeq = Vec<Option<HourFrame>>;
