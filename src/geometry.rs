use crate::errors::BorefieldError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Borefield layout: individual borehole positions plus the builders for the
/// common regular patterns. Positions feed a g-function provider; the engine
/// itself only consumes the aggregate [`FieldMetadata`].

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Borehole {
    /// Position of the borehole head in the field plane, metres.
    pub x: f64,
    pub y: f64,
    /// Active length below the buried depth, metres.
    pub h: f64,
    pub buried_depth: f64,
    /// Borehole radius, metres.
    pub r_b: f64,
    /// Tilt from vertical in radians; 0 is a vertical borehole.
    pub tilt: f64,
    /// Compass orientation of the tilt in radians, measured from the x axis.
    pub orientation: f64,
}

impl Borehole {
    pub fn vertical(x: f64, y: f64, h: f64, buried_depth: f64, r_b: f64) -> Self {
        Self {
            x,
            y,
            h,
            buried_depth,
            r_b,
            tilt: 0.,
            orientation: 0.,
        }
    }
}

/// Aggregate field properties consumed by the temperature engine.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub n_boreholes: usize,
    pub h: f64,
    pub buried_depth: f64,
    pub r_b: f64,
    pub avg_tilt: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BoreholeField {
    boreholes: Vec<Borehole>,
}

impl BoreholeField {
    pub fn new(boreholes: Vec<Borehole>) -> Result<Self, BorefieldError> {
        if boreholes.is_empty() {
            return Err(BorefieldError::EmptyField);
        }
        Ok(Self { boreholes })
    }

    /// Full n1 x n2 grid with spacings b1 (x) and b2 (y).
    pub fn rectangle(
        n1: usize,
        n2: usize,
        b1: f64,
        b2: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let boreholes = (0..n2)
            .cartesian_product(0..n1)
            .map(|(j, i)| Borehole::vertical(i as f64 * b1, j as f64 * b2, h, buried_depth, r_b))
            .collect();
        Self::new(boreholes)
    }

    /// Staggered grid: odd rows are shifted by half a spacing and drop the
    /// last borehole when that shift pushes it past the field edge.
    pub fn staggered_rectangle(
        n1: usize,
        n2: usize,
        b1: f64,
        b2: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let mut boreholes = Vec::new();
        for j in 0..n2 {
            let odd = j % 2 == 1;
            let row_len = if odd && n1 > 1 { n1 - 1 } else { n1 };
            let shift = if odd { b1 / 2. } else { 0. };
            for i in 0..row_len {
                boreholes.push(Borehole::vertical(
                    i as f64 * b1 + shift,
                    j as f64 * b2,
                    h,
                    buried_depth,
                    r_b,
                ));
            }
        }
        Self::new(boreholes)
    }

    /// Perimeter of an n1 x n2 grid, hollow inside.
    pub fn box_shape(
        n1: usize,
        n2: usize,
        b1: f64,
        b2: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let boreholes = (0..n2)
            .cartesian_product(0..n1)
            .filter(|(j, i)| *i == 0 || *i == n1 - 1 || *j == 0 || *j == n2 - 1)
            .map(|(j, i)| Borehole::vertical(i as f64 * b1, j as f64 * b2, h, buried_depth, r_b))
            .collect();
        Self::new(boreholes)
    }

    /// Two legs along the x and y axes sharing the corner borehole.
    pub fn l_shape(
        n1: usize,
        n2: usize,
        b1: f64,
        b2: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let mut boreholes = Vec::new();
        for i in 0..n1 {
            boreholes.push(Borehole::vertical(i as f64 * b1, 0., h, buried_depth, r_b));
        }
        for j in 1..n2 {
            boreholes.push(Borehole::vertical(0., j as f64 * b2, h, buried_depth, r_b));
        }
        Self::new(boreholes)
    }

    /// Three sides of the perimeter, open along the top row.
    pub fn u_shape(
        n1: usize,
        n2: usize,
        b1: f64,
        b2: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let mut boreholes = Vec::new();
        for i in 0..n1 {
            boreholes.push(Borehole::vertical(i as f64 * b1, 0., h, buried_depth, r_b));
        }
        for j in 1..n2 {
            boreholes.push(Borehole::vertical(0., j as f64 * b2, h, buried_depth, r_b));
            if n1 > 1 {
                boreholes.push(Borehole::vertical(
                    (n1 - 1) as f64 * b1,
                    j as f64 * b2,
                    h,
                    buried_depth,
                    r_b,
                ));
            }
        }
        Self::new(boreholes)
    }

    /// n boreholes equally spaced on a circle of the given radius.
    pub fn circle(
        n: usize,
        radius: f64,
        h: f64,
        buried_depth: f64,
        r_b: f64,
    ) -> Result<Self, BorefieldError> {
        let mut boreholes = Vec::with_capacity(n);
        for k in 0..n {
            let angle = 2. * PI * k as f64 / n as f64;
            boreholes.push(Borehole::vertical(
                radius * angle.cos(),
                radius * angle.sin(),
                h,
                buried_depth,
                r_b,
            ));
        }
        Self::new(boreholes)
    }

    pub fn boreholes(&self) -> &[Borehole] {
        &self.boreholes
    }

    pub fn len(&self) -> usize {
        self.boreholes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boreholes.is_empty()
    }

    /// Apply one borehole length to the whole field, as sizing does.
    pub fn set_length(&mut self, h: f64) {
        for borehole in &mut self.boreholes {
            borehole.h = h;
        }
    }

    /// Field aggregates. Length, buried depth and radius are averaged; the
    /// engine treats the field as uniform in those.
    pub fn metadata(&self) -> FieldMetadata {
        let n = self.boreholes.len();
        let inv = 1. / n as f64;
        FieldMetadata {
            n_boreholes: n,
            h: self.boreholes.iter().map(|b| b.h).sum::<f64>() * inv,
            buried_depth: self.boreholes.iter().map(|b| b.buried_depth).sum::<f64>() * inv,
            r_b: self.boreholes.iter().map(|b| b.r_b).sum::<f64>() * inv,
            avg_tilt: self.boreholes.iter().map(|b| b.tilt).sum::<f64>() * inv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn rectangle_fills_the_grid() {
        let field = BoreholeField::rectangle(3, 4, 6., 7., 110., 4., 0.075).unwrap();
        assert_eq!(field.len(), 12);
        let last = field.boreholes().last().unwrap();
        assert_relative_eq!(last.x, 12.);
        assert_relative_eq!(last.y, 21.);
    }

    #[rstest]
    fn box_keeps_only_the_perimeter() {
        let field = BoreholeField::box_shape(4, 5, 6., 6., 110., 4., 0.075).unwrap();
        // 4*5 grid minus the 2*3 interior
        assert_eq!(field.len(), 14);
    }

    #[rstest]
    fn l_shape_shares_the_corner() {
        let field = BoreholeField::l_shape(4, 3, 6., 6., 110., 4., 0.075).unwrap();
        assert_eq!(field.len(), 4 + 2);
    }

    #[rstest]
    fn u_shape_leaves_the_top_open() {
        let field = BoreholeField::u_shape(4, 3, 6., 6., 110., 4., 0.075).unwrap();
        // bottom row of 4, two legs of 2
        assert_eq!(field.len(), 8);
    }

    #[rstest]
    fn staggered_rows_alternate_length() {
        let field = BoreholeField::staggered_rectangle(4, 3, 6., 6., 110., 4., 0.075).unwrap();
        assert_eq!(field.len(), 4 + 3 + 4);
        // second row is shifted by half a spacing
        assert_relative_eq!(field.boreholes()[4].x, 3.);
    }

    #[rstest]
    fn circle_spaces_boreholes_evenly() {
        let field = BoreholeField::circle(8, 10., 110., 4., 0.075).unwrap();
        assert_eq!(field.len(), 8);
        for borehole in field.boreholes() {
            assert_relative_eq!(
                (borehole.x.powi(2) + borehole.y.powi(2)).sqrt(),
                10.,
                max_relative = 1e-12
            );
        }
    }

    #[rstest]
    fn empty_field_is_rejected() {
        assert!(matches!(
            BoreholeField::new(vec![]),
            Err(BorefieldError::EmptyField)
        ));
    }

    #[rstest]
    fn metadata_averages_the_field() {
        let mut field = BoreholeField::rectangle(2, 2, 6., 6., 110., 4., 0.075).unwrap();
        field.set_length(95.);
        let meta = field.metadata();
        assert_eq!(meta.n_boreholes, 4);
        assert_relative_eq!(meta.h, 95.);
        assert_relative_eq!(meta.avg_tilt, 0.);
    }
}
