use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::dataset::PartClass;

/// One-hot vector for `class`: `1.0` at its index, `0.0` elsewhere.
pub fn one_hot(class: PartClass) -> Array1<f32> {
    let mut vec = Array1::zeros(PartClass::COUNT);
    vec[class.index()] = 1.0;
    vec
}

/// Index of the largest entry; the first one wins ties.
pub fn argmax(vec: ArrayView1<'_, f32>) -> Option<usize> {
    vec.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Decodes a probability or one-hot vector back to its class.
pub fn decode_class(vec: ArrayView1<'_, f32>) -> Option<PartClass> {
    argmax(vec).and_then(PartClass::from_index)
}

/// Divides each row by its sum; all-zero rows stay zero.
pub(crate) fn normalize_rows(matrix: &Array2<f64>) -> Array2<f64> {
    let mut out = matrix.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let sum: f64 = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_one_hot_and_decode() {
        for class in PartClass::ALL {
            let vec = one_hot(class);
            assert_eq!(vec.len(), 3);
            assert_eq!(vec.sum(), 1.0);
            assert_eq!(vec[class.index()], 1.0);
            assert_eq!(decode_class(vec.view()), Some(class));
        }
        assert_eq!(one_hot(PartClass::DigikeySku), array![0.0, 0.0, 1.0]);
        assert_eq!(one_hot(PartClass::Mpn), array![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_argmax_ties_and_empty() {
        assert_eq!(argmax(array![0.5f32, 0.5, 0.0].view()), Some(0));
        assert_eq!(argmax(array![0.1f32, 0.2, 0.7].view()), Some(2));
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_normalize_rows() {
        let m = array![[2.0, 2.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 3.0]];
        let n = normalize_rows(&m);
        assert_eq!(n.row(0), array![0.5, 0.5, 0.0]);
        assert_eq!(n.row(1), array![0.0, 0.0, 0.0]);
        assert_eq!(n.row(2), array![0.25, 0.0, 0.75]);
    }
}
