//! Lower/diagonal/upper addressing derived from face connectivity.

use crate::error::{FvError, Result};

/// Face-based addressing of an LDU matrix.
///
/// Internal face `f` couples `lower[f]` (the owner) with `upper[f]` (the
/// neighbour), `lower[f] < upper[f]`, and faces are sorted by owner.
#[derive(Debug, Clone, PartialEq)]
pub struct LduAddressing {
    n_cells: usize,
    lower: Vec<usize>,
    upper: Vec<usize>,
    owner_start: Vec<usize>,
    losort: Vec<usize>,
    losort_start: Vec<usize>,
    patch_addr: Vec<Vec<usize>>,
}

impl LduAddressing {
    pub fn new(
        n_cells: usize,
        lower: Vec<usize>,
        upper: Vec<usize>,
        patch_addr: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(FvError::size("upper addressing", lower.len(), upper.len()));
        }

        for (f, (&l, &u)) in lower.iter().zip(upper.iter()).enumerate() {
            if l >= n_cells || u >= n_cells {
                return Err(FvError::Mesh(format!(
                    "face {f} addresses cell outside 0..{n_cells}"
                )));
            }
            if l >= u {
                return Err(FvError::Mesh(format!(
                    "face {f}: owner {l} must be lower than neighbour {u}"
                )));
            }
            if f > 0 {
                let (pl, pu) = (lower[f - 1], upper[f - 1]);
                if l < pl || (l == pl && u <= pu) {
                    return Err(FvError::Mesh(format!(
                        "internal faces are not in upper-triangular order at face {f}"
                    )));
                }
            }
        }

        for (p, cells) in patch_addr.iter().enumerate() {
            if let Some(&bad) = cells.iter().find(|&&c| c >= n_cells) {
                return Err(FvError::Mesh(format!(
                    "patch {p} addresses cell {bad} outside 0..{n_cells}"
                )));
            }
        }

        let mut owner_start = vec![0usize; n_cells + 1];
        for &l in &lower {
            owner_start[l + 1] += 1;
        }
        for c in 0..n_cells {
            owner_start[c + 1] += owner_start[c];
        }

        let mut losort: Vec<usize> = (0..lower.len()).collect();
        losort.sort_by_key(|&f| (upper[f], lower[f]));

        let mut losort_start = vec![0usize; n_cells + 1];
        for &u in &upper {
            losort_start[u + 1] += 1;
        }
        for c in 0..n_cells {
            losort_start[c + 1] += losort_start[c];
        }

        Ok(Self {
            n_cells,
            lower,
            upper,
            owner_start,
            losort,
            losort_start,
            patch_addr,
        })
    }

    pub fn size(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.lower.len()
    }

    pub fn lower_addr(&self) -> &[usize] {
        &self.lower
    }

    pub fn upper_addr(&self) -> &[usize] {
        &self.upper
    }

    /// `owner_start[c]..owner_start[c + 1]` are the faces owned by `c`.
    pub fn owner_start(&self) -> &[usize] {
        &self.owner_start
    }

    /// Face indices sorted by neighbour cell.
    pub fn losort(&self) -> &[usize] {
        &self.losort
    }

    pub fn losort_start(&self) -> &[usize] {
        &self.losort_start
    }

    pub fn patch_addr(&self, patch: usize) -> &[usize] {
        &self.patch_addr[patch]
    }

    pub fn n_patches(&self) -> usize {
        self.patch_addr.len()
    }

    /// Internal faces touching `cell`, owned faces first.
    pub fn cell_faces(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        let owned = self.owner_start[cell]..self.owner_start[cell + 1];
        let neighboured = self.losort[self.losort_start[cell]..self.losort_start[cell + 1]]
            .iter()
            .copied();
        owned.chain(neighboured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> LduAddressing {
        // 0-1, 0-2, 1-2
        LduAddressing::new(3, vec![0, 0, 1], vec![1, 2, 2], vec![vec![0], vec![2]]).unwrap()
    }

    #[test]
    fn owner_start_and_losort() {
        let a = triangle();
        assert_eq!(a.owner_start(), &[0, 2, 3, 3]);
        assert_eq!(a.losort(), &[0, 1, 2]);
        assert_eq!(a.losort_start(), &[0, 0, 1, 3]);
        let faces: Vec<usize> = a.cell_faces(2).collect();
        assert_eq!(faces, vec![1, 2]);
        assert_eq!(a.patch_addr(1), &[2]);
    }

    #[test]
    fn rejects_unsorted_faces() {
        let err = LduAddressing::new(3, vec![1, 0], vec![2, 1], vec![]).unwrap_err();
        assert!(err.to_string().contains("upper-triangular"));
    }

    #[test]
    fn rejects_reversed_face() {
        assert!(LduAddressing::new(2, vec![1], vec![0], vec![]).is_err());
    }
}
