// Hunt/target shot selection over an opponent board.
// Shared by the bot authority and the client's autoplay input.

use alloc::vec::Vec;
use rand::Rng;

use crate::core::board::Board;
use crate::core::common::Cell;
use crate::core::coord::Coord;

/// Candidate cells extending a damaged ship that is not yet sunk.
///
/// When two or more hits line up, only the ends of that line are returned;
/// a lone hit yields all of its open cardinal neighbours.
pub fn follow_up_targets(board: &Board) -> Vec<Coord> {
    let mut lined = Vec::new();
    let mut loose = Vec::new();
    for hit in board.cells_matching(|c| c == Cell::Hit) {
        for next in hit.cardinal() {
            if board.get(next) != Cell::Empty {
                continue;
            }
            let Some((dx, dy)) = hit.step_to(next) else {
                continue;
            };
            let behind = hit.offset(-dx, -dy).map(|b| board.get(b));
            if behind == Some(Cell::Hit) {
                lined.push(next);
            } else {
                loose.push(next);
            }
        }
    }
    let mut picks = if lined.is_empty() { loose } else { lined };
    picks.sort_unstable();
    picks.dedup();
    picks
}

/// Choose the next cell to fire at, or `None` when nothing is left to shoot.
///
/// Finishes off damaged ships first, otherwise picks a random empty cell.
pub fn pick_target<R: Rng>(board: &Board, rng: &mut R) -> Option<Coord> {
    let follow = follow_up_targets(board);
    if !follow.is_empty() {
        return Some(follow[rng.random_range(0..follow.len())]);
    }
    let open = board.cells_matching(|c| c == Cell::Empty);
    if open.is_empty() {
        return None;
    }
    Some(open[rng.random_range(0..open.len())])
}
