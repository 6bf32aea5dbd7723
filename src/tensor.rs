//! Dense and sparse tensors produced by storage queries.
//!
//! Edge endpoints and timestamps come back as parallel `i64` vectors. Node and
//! edge features come back as COO sparse tensors whose leading dimensions are
//! indexed by `(time, node)` or `(time, src, dst)` and whose trailing
//! dimensions are the feature shape.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, IxDyn};

use crate::error::{DgError, Result};

/// Parallel `src`, `dst`, `time` vectors, one entry per edge event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeTensors {
    /// Source node ids.
    pub src: Array1<i64>,
    /// Destination node ids.
    pub dst: Array1<i64>,
    /// Event timestamps.
    pub time: Array1<i64>,
}

impl EdgeTensors {
    /// Builds the three vectors from row triples.
    pub fn from_rows(rows: &[(i64, i64, i64)]) -> Self {
        Self {
            src: rows.iter().map(|r| r.0).collect(),
            dst: rows.iter().map(|r| r.1).collect(),
            time: rows.iter().map(|r| r.2).collect(),
        }
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.src.len()
    }

    /// Whether no edges are present.
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// COO sparse tensor with dense trailing feature dimensions.
///
/// Indices are coalesced at construction: they are sorted lexicographically
/// and a repeated index keeps the value inserted last.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseTensor {
    indices: Array2<i64>,
    values: ArrayD<f32>,
    shape: Vec<usize>,
}

impl SparseTensor {
    /// Builds a tensor from `(index, value)` entries in write order.
    ///
    /// `sparse_shape` covers the indexed dimensions and `feature_shape` the
    /// shape every value must have.
    pub fn from_entries<I>(entries: I, sparse_shape: Vec<usize>, feature_shape: &[usize]) -> Result<Self>
    where
        I: IntoIterator<Item = (Vec<i64>, ArrayD<f32>)>,
    {
        let sparse_dim = sparse_shape.len();
        let mut coalesced: BTreeMap<Vec<i64>, ArrayD<f32>> = BTreeMap::new();
        for (index, value) in entries {
            if index.len() != sparse_dim {
                return Err(DgError::invalid(format!(
                    "sparse index has {} dims, expected {sparse_dim}",
                    index.len()
                )));
            }
            if value.shape() != feature_shape {
                return Err(DgError::invalid(format!(
                    "sparse value shape {:?} does not match {:?}",
                    value.shape(),
                    feature_shape
                )));
            }
            coalesced.insert(index, value);
        }

        let nnz = coalesced.len();
        let feat_len: usize = feature_shape.iter().product();
        let mut flat_idx = Vec::with_capacity(sparse_dim * nnz);
        let mut flat_vals = Vec::with_capacity(feat_len * nnz);
        // Row-major (nnz, sparse_dim) first, transposed below.
        for (index, value) in &coalesced {
            flat_idx.extend_from_slice(index);
            flat_vals.extend(value.iter().copied());
        }
        let indices = Array2::from_shape_vec((nnz, sparse_dim), flat_idx)
            .map_err(|err| DgError::invalid(format!("sparse index layout: {err}")))?
            .reversed_axes()
            .as_standard_layout()
            .into_owned();

        let mut value_shape = Vec::with_capacity(1 + feature_shape.len());
        value_shape.push(nnz);
        value_shape.extend_from_slice(feature_shape);
        let values = ArrayD::from_shape_vec(IxDyn(&value_shape), flat_vals)
            .map_err(|err| DgError::invalid(format!("sparse value layout: {err}")))?;

        let mut shape = sparse_shape;
        shape.extend_from_slice(feature_shape);
        Ok(Self {
            indices,
            values,
            shape,
        })
    }

    /// Index matrix of shape `(sparse_dim, nnz)`.
    pub fn indices(&self) -> &Array2<i64> {
        &self.indices
    }

    /// Stacked values of shape `(nnz, *feature_shape)`.
    pub fn values(&self) -> &ArrayD<f32> {
        &self.values
    }

    /// Full logical shape (sparse dims followed by feature dims).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of indexed dimensions.
    pub fn sparse_dim(&self) -> usize {
        self.indices.nrows()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.indices.ncols()
    }

    /// Returns row `dim` of the index matrix.
    pub fn index_row(&self, dim: usize) -> Array1<i64> {
        self.indices.row(dim).to_owned()
    }

    /// Consumes the tensor, returning its stacked values.
    pub fn into_values(self) -> ArrayD<f32> {
        self.values
    }

    /// Expands into a dense zero-filled tensor.
    ///
    /// Fails when an index is negative or outside the logical shape.
    pub fn to_dense(&self) -> Result<ArrayD<f32>> {
        let sparse_dim = self.sparse_dim();
        let feat_len: usize = self.shape[sparse_dim..].iter().product();
        let mut dense = ArrayD::<f32>::zeros(IxDyn(&self.shape));
        let values = self.values.as_standard_layout();
        let src = values
            .as_slice()
            .ok_or_else(|| DgError::invalid("sparse values are not contiguous"))?;
        let dst = dense
            .as_slice_mut()
            .ok_or_else(|| DgError::invalid("dense buffer is not contiguous"))?;

        for entry in 0..self.nnz() {
            let mut offset = 0usize;
            for dim in 0..sparse_dim {
                let raw = self.indices[[dim, entry]];
                let extent = self.shape[dim];
                let pos = usize::try_from(raw)
                    .ok()
                    .filter(|p| *p < extent)
                    .ok_or_else(|| {
                        DgError::invalid(format!(
                            "sparse index {raw} out of bounds for dim {dim} of size {extent}"
                        ))
                    })?;
                offset = offset * extent + pos;
            }
            let start = offset * feat_len;
            dst[start..start + feat_len]
                .copy_from_slice(&src[entry * feat_len..(entry + 1) * feat_len]);
        }
        Ok(dense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn feat(vals: &[f32]) -> ArrayD<f32> {
        arr1(vals).into_dyn()
    }

    #[test]
    fn coalesce_sorts_and_keeps_last_write() {
        let entries = vec![
            (vec![5, 1], feat(&[1.0, 1.0])),
            (vec![1, 3], feat(&[2.0, 2.0])),
            (vec![5, 1], feat(&[9.0, 9.0])),
        ];
        let sparse = SparseTensor::from_entries(entries, vec![6, 4], &[2]).unwrap();
        assert_eq!(sparse.nnz(), 2);
        assert_eq!(sparse.shape(), &[6, 4, 2]);
        assert_eq!(sparse.index_row(0), arr1(&[1, 5]));
        assert_eq!(sparse.index_row(1), arr1(&[3, 1]));
        assert_eq!(sparse.values()[&[1, 0][..]], 9.0);
    }

    #[test]
    fn to_dense_places_values() {
        let entries = vec![(vec![1, 2], feat(&[3.0]))];
        let sparse = SparseTensor::from_entries(entries, vec![2, 3], &[1]).unwrap();
        let dense = sparse.to_dense().unwrap();
        assert_eq!(dense.shape(), &[2, 3, 1]);
        assert_eq!(dense[&[1, 2, 0][..]], 3.0);
        assert_eq!(dense.sum(), 3.0);
    }

    #[test]
    fn to_dense_rejects_negative_index() {
        let entries = vec![(vec![-1, 0], feat(&[1.0]))];
        let sparse = SparseTensor::from_entries(entries, vec![1, 1], &[1]).unwrap();
        assert!(sparse.to_dense().is_err());
    }

    #[test]
    fn rejects_value_of_wrong_shape() {
        let entries = vec![(vec![0, 0], feat(&[1.0, 2.0]))];
        assert!(SparseTensor::from_entries(entries, vec![1, 1], &[3]).is_err());
    }

    #[test]
    fn edge_tensors_from_rows() {
        let edges = EdgeTensors::from_rows(&[(2, 3, 1), (10, 20, 5)]);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges.src, arr1(&[2, 10]));
        assert_eq!(edges.time, arr1(&[1, 5]));
    }
}
