//! Average re-referencing: subtract the cross-channel mean at each sample.

use ndarray::{Array2, Axis};

pub fn average_reference_inplace(data: &mut Array2<f64>) {
    if let Some(means) = data.mean_axis(Axis(0)) {
        for mut row in data.rows_mut() {
            row -= &means;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Axis};

    #[test]
    fn channel_sum_is_zero_after_reference() {
        let mut data = Array2::from_shape_fn((8, 256), |(c, t)| ((c * 7 + t * 3) as f64).sin());
        average_reference_inplace(&mut data);
        for &s in data.sum_axis(Axis(0)).iter() {
            assert_abs_diff_eq!(s, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn channel_differences_are_preserved() {
        let mut data = Array2::from_shape_fn((2, 10), |(c, _)| if c == 0 { 2.0 } else { 4.0 });
        average_reference_inplace(&mut data);
        for t in 0..10 {
            assert_abs_diff_eq!(data[[0, t]] - data[[1, t]], -2.0, epsilon = 1e-12);
        }
    }
}
