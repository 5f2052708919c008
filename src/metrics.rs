use crate::grid::counts_at;
use crate::lattice::Lattice;

/// Index reported when no occupied cell has an occupied neighbor.
///
/// The mean over an empty set is undefined; such a lattice is reported as
/// showing no measurable clustering. Use [`segregation_index_checked`] to
/// tell this case apart from a genuine zero.
pub const ISOLATED_LATTICE_INDEX: f64 = 0.0;

/// Mean share of same-type occupied neighbors over the occupied cells that
/// have at least one occupied neighbor, or `None` if there are none.
pub fn segregation_index_checked(lattice: &Lattice) -> Option<f64> {
    let mut sum = 0.0;
    let mut included = 0usize;
    for pos in lattice.positions() {
        if !lattice.cell_at(pos.row, pos.col).is_occupied() {
            continue;
        }
        // Isolated agents are left out of the average entirely.
        if let Some(ratio) = counts_at(lattice, pos.row, pos.col).ratio() {
            sum += ratio;
            included += 1;
        }
    }
    (included > 0).then(|| sum / included as f64)
}

/// Segregation index of the lattice, in `[0, 1]`.
///
/// Falls back to [`ISOLATED_LATTICE_INDEX`] when no occupied cell has an
/// occupied neighbor.
pub fn segregation_index(lattice: &Lattice) -> f64 {
    segregation_index_checked(lattice).unwrap_or(ISOLATED_LATTICE_INDEX)
}
