//! Structure boundary overlay for the registered annotation volume.

use ndarray::Array3;

const FACE_NEIGHBORS: [(isize, isize, isize); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

fn touches_other_label(labels: &Array3<u32>, index: (usize, usize, usize), value: u32) -> bool {
    let dims = labels.dim();
    let (z, y, x) = (index.0 as isize, index.1 as isize, index.2 as isize);
    for (dz, dy, dx) in FACE_NEIGHBORS {
        let (nz, ny, nx) = (z + dz, y + dy, x + dx);
        if nz < 0 || ny < 0 || nx < 0 {
            continue;
        }
        let (nz, ny, nx) = (nz as usize, ny as usize, nx as usize);
        if nz >= dims.0 || ny >= dims.1 || nx >= dims.2 {
            continue;
        }
        if labels[[nz, ny, nx]] != value {
            return true;
        }
    }
    false
}

/// Mark voxels on the inside edge of each labelled structure.
///
/// A voxel is boundary (1) when it carries a non-zero label and any of
/// its six face neighbors carries a different one. Background stays 0,
/// so the overlay can sit directly on the raw image.
#[must_use]
pub fn boundary_image(labels: &Array3<u32>) -> Array3<i8> {
    Array3::from_shape_fn(labels.dim(), |index| {
        let value = labels[index];
        if value == 0 {
            return 0;
        }
        i8::from(touches_other_label(labels, index, value))
    })
}
