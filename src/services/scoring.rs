//! Availability probability scoring
//!
//! Pure function of a snapshot and the demand ledger counts. The expression
//! order below must not be rearranged: persisted values from earlier
//! deployments were produced with exactly this floating-point evaluation.

use crate::domain::types::LotSnapshot;

/// Round to 2 decimal places, half away from zero
#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score the chance of finding a free space, in `[0, 100]` with 2 decimals
pub fn probability(snapshot: &LotSnapshot, booking_count: usize, visit_count: usize) -> f64 {
    if snapshot.total_spaces == 0 {
        return 0.0;
    }

    let total = snapshot.total_spaces as f64;
    let occupied = snapshot.occupied_spaces as f64;
    let bookings = booking_count as f64;
    let visits = visit_count as f64;

    let visit_factor = if visit_count > 0 { 0.2 / visits.max(1.0) } else { 0.0 };

    let occupancy_penalty = (occupied / total) * 100.0;
    let booking_penalty = bookings * (1.0 / total * 100.0);
    let visit_penalty = visits * visit_factor;

    let raw = (100.0 - occupancy_penalty - booking_penalty - visit_penalty).max(0.0);
    round2(raw).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: u32, free: u32, occupied: u32) -> LotSnapshot {
        LotSnapshot {
            total_spaces: total,
            free_spaces: free,
            occupied_spaces: occupied,
            timestamp: String::new(),
        }
    }

    #[test]
    fn test_booking_and_occupancy_penalties() {
        // 100 - 30 (occupancy) - 20 (bookings) - 0 (visits)
        assert_eq!(probability(&snapshot(10, 7, 3), 2, 0), 50.00);
    }

    #[test]
    fn test_empty_lot_scores_zero() {
        assert_eq!(probability(&snapshot(0, 0, 0), 0, 0), 0.0);
        assert_eq!(probability(&snapshot(0, 0, 0), 5, 12), 0.0);
    }

    #[test]
    fn test_visits_cost_at_most_point_two() {
        // visit_count * (0.2 / visit_count) == 0.2 regardless of count
        assert_eq!(probability(&snapshot(10, 10, 0), 0, 1), 99.8);
        assert_eq!(probability(&snapshot(10, 10, 0), 0, 250), 99.8);
    }

    #[test]
    fn test_floor_at_zero() {
        assert_eq!(probability(&snapshot(4, 0, 4), 3, 2), 0.0);
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        // 100 - 100/3 = 66.666...
        assert_eq!(probability(&snapshot(3, 2, 1), 0, 0), 66.67);
        // 100 - 200/7 - 0.2 = 71.2285...
        assert_eq!(probability(&snapshot(7, 5, 2), 0, 3), 71.23);
    }

    #[test]
    fn test_idempotent() {
        let snap = snapshot(13, 4, 9);
        let first = probability(&snap, 1, 4);
        for _ in 0..10 {
            assert_eq!(probability(&snap, 1, 4), first);
        }
    }

    #[test]
    fn test_always_within_bounds() {
        for total in 0..12u32 {
            for occupied in 0..=total {
                for bookings in 0..6 {
                    for visits in 0..6 {
                        let p = probability(&snapshot(total, total - occupied, occupied), bookings, visits);
                        assert!((0.0..=100.0).contains(&p), "out of range: {p}");
                    }
                }
            }
        }
    }
}
